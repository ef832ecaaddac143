//! JSON-RPC 2.0 envelopes and MCP result payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Newest protocol revision this server speaks.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";

pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Transport-level rejection (wrong HTTP method, stateless mode).
    pub const SERVER_ERROR: i32 = -32000;
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not allowed.")]
    MethodNotAllowed,
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::MethodNotAllowed => SERVER_ERROR,
        }
    }

    pub fn to_response(&self, id: Value) -> Value {
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            },
            "id": id,
        })
    }
}

impl From<serde_json::Error> for McpError {
    fn from(value: serde_json::Error) -> Self {
        McpError::InternalError(value.to_string())
    }
}

pub type McpResult<T> = Result<T, McpError>;

/// Inbound message shapes after envelope inspection.
#[derive(Debug, Clone)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
    },
    /// Responses from the client to server-initiated requests. Stateless
    /// mode never issues any, so these are accepted and dropped.
    Response,
}

impl Incoming {
    pub fn classify(message: &Value) -> McpResult<Self> {
        let object = message
            .as_object()
            .ok_or_else(|| McpError::InvalidRequest("message must be an object".to_string()))?;
        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(McpError::InvalidRequest(
                "jsonrpc must be \"2.0\"".to_string(),
            ));
        }

        match (object.get("method"), object.get("id")) {
            (Some(Value::String(method)), Some(id)) => {
                if !(id.is_string() || id.is_number()) {
                    return Err(McpError::InvalidRequest(
                        "id must be a string or number".to_string(),
                    ));
                }
                Ok(Incoming::Request {
                    id: id.clone(),
                    method: method.clone(),
                    params: object.get("params").cloned(),
                })
            }
            (Some(Value::String(method)), None) => Ok(Incoming::Notification {
                method: method.clone(),
            }),
            (Some(_), _) => Err(McpError::InvalidRequest(
                "method must be a string".to_string(),
            )),
            (None, Some(_)) if object.contains_key("result") || object.contains_key("error") => {
                Ok(Incoming::Response)
            }
            (None, _) => Err(McpError::InvalidRequest("missing method".to_string())),
        }
    }
}

pub fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
    Resource { resource: ResourceContents },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResult {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Map<String, Value>>,
}
