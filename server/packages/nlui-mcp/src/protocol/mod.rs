//! Stateless MCP engine, written against the adapter traits only.
//!
//! Each call reads one framed request to the end, dispatches every JSON-RPC
//! message in it and writes the replies either as one JSON document or as
//! an SSE stream, depending on what the client accepts.

use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderMap, HeaderValue, Method};
use serde_json::{json, Map, Value};

use crate::adapter::{AdapterError, RequestStream, ResponseChunk, ResponseSink};
use crate::tools::{Prompt, Tool};

pub mod message;

use message::{
    success, Incoming, McpError, McpResult, PromptGetParams, ServerInfo, ToolCallParams,
    LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};

pub const SERVER_NAME: &str = "nlui-mcp-server";

pub struct McpServer {
    info: ServerInfo,
    tools: Vec<Arc<dyn Tool>>,
    prompts: Vec<Arc<dyn Prompt>>,
}

impl McpServer {
    pub fn new() -> Self {
        Self {
            info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            tools: Vec::new(),
            prompts: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn with_prompt(mut self, prompt: impl Prompt + 'static) -> Self {
        self.prompts.push(Arc::new(prompt));
        self
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Serves one framed exchange. Adapter misuse is returned as an error;
    /// every protocol-level problem is answered on `res`.
    pub async fn handle_request<Q, R>(&self, req: &mut Q, res: R) -> Result<(), AdapterError>
    where
        Q: RequestStream,
        R: ResponseSink,
    {
        let started = Instant::now();

        if req.method() != Method::POST {
            tracing::debug!(method = %req.method(), "mcp: rejecting non-POST request");
            return write_json(&res, 405, &McpError::MethodNotAllowed.to_response(Value::Null));
        }

        let body = req.read_to_end();
        let parsed: Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, bytes = body.len(), "mcp: unparseable request body");
                let error = McpError::ParseError(err.to_string());
                return write_json(&res, 400, &error.to_response(Value::Null));
            }
        };

        let (messages, batch) = match parsed {
            Value::Array(items) => (items, true),
            other => (vec![other], false),
        };
        if messages.is_empty() {
            let error = McpError::InvalidRequest("empty batch".to_string());
            return write_json(&res, 400, &error.to_response(Value::Null));
        }

        let mut replies = Vec::new();
        for message in &messages {
            match Incoming::classify(message) {
                Ok(Incoming::Request { id, method, params }) => {
                    replies.push(self.handle_call(id, &method, params));
                }
                Ok(Incoming::Notification { method }) => {
                    tracing::debug!(method = %method, "mcp: notification accepted");
                }
                Ok(Incoming::Response) => {
                    tracing::debug!("mcp: ignoring client response in stateless mode");
                }
                Err(err) => {
                    let id = message.get("id").cloned().unwrap_or(Value::Null);
                    replies.push(err.to_response(id));
                }
            }
        }

        if replies.is_empty() {
            res.write_head(202, None)?;
            return res.end(None);
        }

        res.on_close(Box::new(|| {
            tracing::info!("mcp: client disconnected before reply completed");
        }));

        let sse = accepts_event_stream(req.headers());
        if sse {
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            res.write_head(200, Some(headers))?;
            for reply in &replies {
                res.write(ResponseChunk::Text(format!("event: message\ndata: {reply}\n\n")))?;
            }
            res.end(None)?;
        } else {
            let body = if batch {
                Value::Array(replies.clone())
            } else {
                replies[0].clone()
            };
            write_json(&res, 200, &body)?;
        }

        tracing::info!(
            messages = messages.len(),
            replies = replies.len(),
            sse,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mcp: exchange complete"
        );
        Ok(())
    }

    fn handle_call(&self, id: Value, method: &str, params: Option<Value>) -> Value {
        match self.dispatch(method, params) {
            Ok(result) => success(id, result),
            Err(err) => {
                tracing::warn!(method, id = %id, error = %err, "mcp: request failed");
                err.to_response(id)
            }
        }
    }

    fn dispatch(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools: Vec<_> = self.tools.iter().map(|tool| tool.definition()).collect();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => self.call_tool(params),
            "prompts/list" => {
                let prompts: Vec<_> = self
                    .prompts
                    .iter()
                    .map(|prompt| prompt.definition())
                    .collect();
                Ok(json!({ "prompts": prompts }))
            }
            "prompts/get" => self.get_prompt(params),
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    fn initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let requested = params
            .as_ref()
            .and_then(|params| params.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = match requested {
            Some(version) if SUPPORTED_PROTOCOL_VERSIONS.contains(&version) => version,
            _ => LATEST_PROTOCOL_VERSION,
        };
        Ok(json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
            },
            "serverInfo": self.info,
        }))
    }

    fn call_tool(&self, params: Option<Value>) -> McpResult<Value> {
        let params: ToolCallParams = parse_params(params)?;
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name() == params.name)
            .ok_or_else(|| McpError::InvalidParams(format!("Tool {} not found", params.name)))?;
        let result = tool.call(params.arguments);
        Ok(serde_json::to_value(result)?)
    }

    fn get_prompt(&self, params: Option<Value>) -> McpResult<Value> {
        let params: PromptGetParams = parse_params(params)?;
        let prompt = self
            .prompts
            .iter()
            .find(|prompt| prompt.name() == params.name)
            .ok_or_else(|| McpError::InvalidParams(format!("Prompt {} not found", params.name)))?;
        let arguments = params.arguments.unwrap_or_else(Map::new);
        Ok(serde_json::to_value(prompt.get(&arguments))?)
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::InvalidParams("params required".to_string()))?;
    serde_json::from_value(params).map_err(|err| McpError::InvalidParams(err.to_string()))
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/event-stream"))
}

fn write_json<R: ResponseSink>(res: &R, status: u16, body: &Value) -> Result<(), AdapterError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    res.write_head(status, Some(headers))?;
    res.end(Some(ResponseChunk::Text(body.to_string())))
}
