use serde_json::{Map, Value};

use crate::protocol::message::{
    Content, PromptArgument, PromptDefinition, PromptMessage, PromptResult,
};

use super::ui_render::TOOL_NAME;
use super::Prompt;

pub const PROMPT_NAME: &str = "init-session";

const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Copy, Default)]
pub struct InitSessionPrompt;

impl InitSessionPrompt {
    fn system_prompt() -> String {
        format!(
            "# NLUI MCP session\n\n\
             You are connected to the NLUI (Natural Language User Interface) MCP server.\n\n\
             ## Available tools\n\n\
             ### {TOOL_NAME}\n\
             Takes a UI description (`block` layout plus optional `showTools` and `showDebug` \
             flags) and returns a URL to an interactive page rendering it.\n\n\
             Call `{TOOL_NAME}` when the user asks to see structured data: tables, cards, \
             forms, lists or alerts. Answer conceptual questions and small talk in plain text \
             without calling any tool."
        )
    }
}

impl Prompt for InitSessionPrompt {
    fn name(&self) -> &'static str {
        PROMPT_NAME
    }

    fn definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: PROMPT_NAME.to_string(),
            description: "Initialize session system prompt".to_string(),
            arguments: vec![PromptArgument {
                name: "language".to_string(),
                description: "Preferred response language".to_string(),
                required: false,
            }],
        }
    }

    fn get(&self, arguments: &Map<String, Value>) -> PromptResult {
        let language = arguments
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LANGUAGE);
        let text = Self::system_prompt();
        tracing::info!(language, prompt_length = text.len(), "init-session: prompt generated");

        PromptResult {
            description: format!("NLUI session prompt ({language})"),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: Content::Text { text },
            }],
        }
    }
}
