//! Tools and prompts exposed through the MCP endpoint.

use serde_json::Value;

use crate::protocol::message::{PromptDefinition, PromptResult, ToolCallResult, ToolDefinition};

pub mod init_session;
pub mod schema_docs;
pub mod ui_render;

pub use init_session::InitSessionPrompt;
pub use schema_docs::{InlineJsonSchemaDocs, SchemaDocumentation};
pub use ui_render::{UiRenderInput, UiRenderTool};

/// A callable tool. Failures are reported inside the result, never as a
/// protocol error, so one bad call cannot take down the exchange.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn definition(&self) -> ToolDefinition;
    fn call(&self, arguments: Option<Value>) -> ToolCallResult;
}

pub trait Prompt: Send + Sync {
    fn name(&self) -> &'static str;
    fn definition(&self) -> PromptDefinition;
    fn get(&self, arguments: &serde_json::Map<String, Value>) -> PromptResult;
}
