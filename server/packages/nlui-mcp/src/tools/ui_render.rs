use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use nlui_error::NluiError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::protocol::message::{Content, ResourceContents, ToolCallResult, ToolDefinition};
use crate::store::InstanceStore;

use super::schema_docs::{inline_schema_for, schema_value, SchemaDocumentation};
use super::Tool;

pub const TOOL_NAME: &str = "ui-render";
pub const INSTANCE_QUERY_PARAM: &str = "instanceId";

/// Arguments accepted by `ui-render`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UiRenderInput {
    /// Layout tree. `main` holds the core content; `header`, `footer`,
    /// `left` and `right` are optional areas. Each area is either a
    /// component (`{"kind": "card", "cardProps": {...}}`) or a nested block.
    pub block: Map<String, Value>,
    /// Show the built-in toolbar (theme and language switcher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_tools: Option<bool>,
    /// Show the raw description next to the rendered page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_debug: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ToolFailure<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
    timestamp: String,
}

/// Stores a UI description and answers with a link the browser can open.
pub struct UiRenderTool {
    store: Arc<InstanceStore>,
    base_url: Url,
    description: String,
}

impl UiRenderTool {
    pub fn new(store: Arc<InstanceStore>, base_url: Url, docs: &dyn SchemaDocumentation) -> Self {
        let schema = inline_schema_for::<UiRenderInput>();
        let description = format!(
            "Generate a URL that renders an interactive page from a UI description.\n\n\
             Use this when the answer is best shown as a table, card, form, list or alert \
             rather than prose. Provide real, complete data; avoid placeholders.\n\n\
             ## Input format\n\n\
             The arguments must match this JSON Schema:\n\n{}\n\n\
             ## Example\n\n{}",
            docs.document("UiRenderInput", &schema),
            example_arguments(),
        );
        Self {
            store,
            base_url,
            description,
        }
    }

    pub fn reference_url(&self, instance_id: &str) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair(INSTANCE_QUERY_PARAM, instance_id);
        url.to_string()
    }

    fn render(&self, arguments: Option<Value>) -> Result<ToolCallResult, NluiError> {
        let document = validate(arguments)?;
        let input: UiRenderInput = serde_json::from_value(document.clone())
            .map_err(|err| NluiError::validation(err.to_string()))?;

        let instance_id = self.store.put(document);
        let uri = self.reference_url(&instance_id);
        tracing::info!(
            instance_id = %instance_id,
            areas = input.block.len(),
            show_tools = input.show_tools.unwrap_or(false),
            show_debug = input.show_debug.unwrap_or(false),
            "ui-render: instance stored"
        );

        Ok(ToolCallResult {
            content: vec![Content::Resource {
                resource: ResourceContents {
                    uri,
                    mime_type: "text/html".to_string(),
                    text: Some(
                        "NLUI Interactive Interface: Generated UI interface based on provided configuration"
                            .to_string(),
                    ),
                },
            }],
            is_error: false,
        })
    }
}

impl Tool for UiRenderTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: self.description.clone(),
            input_schema: schema_value(&inline_schema_for::<UiRenderInput>()),
        }
    }

    fn call(&self, arguments: Option<Value>) -> ToolCallResult {
        let started = Instant::now();
        match self.render(arguments) {
            Ok(result) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ui-render: completed"
                );
                result
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    error_type = ?err.error_type(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ui-render: failed"
                );
                failure_result(&err)
            }
        }
    }
}

fn validate(arguments: Option<Value>) -> Result<Value, NluiError> {
    let document = match arguments {
        Some(value @ Value::Object(_)) => value,
        Some(_) => return Err(NluiError::validation("arguments must be a JSON object")),
        None => return Err(NluiError::validation_field("block", "block is required")),
    };

    match document.get("block") {
        Some(Value::Object(_)) => {}
        Some(_) => return Err(NluiError::validation_field("block", "block must be an object")),
        None => return Err(NluiError::validation_field("block", "block is required")),
    }
    for flag in ["showTools", "showDebug"] {
        if let Some(value) = document.get(flag) {
            if !value.is_boolean() {
                return Err(NluiError::validation_field(
                    flag,
                    format!("{flag} must be a boolean"),
                ));
            }
        }
    }
    Ok(document)
}

fn failure_result(err: &NluiError) -> ToolCallResult {
    let message = err.to_string();
    let failure = ToolFailure {
        kind: "error",
        message: &message,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    let text = serde_json::to_string_pretty(&failure).unwrap_or_else(|_| message.clone());
    ToolCallResult {
        content: vec![Content::Text { text }],
        is_error: true,
    }
}

fn example_arguments() -> String {
    let example = json!({
        "block": {
            "main": {
                "kind": "table",
                "tableProps": {
                    "caption": "Team",
                    "columns": [
                        { "key": "name", "title": "Name", "sortable": true },
                        { "key": "email", "title": "Email", "align": "right" },
                        { "key": "role", "title": "Role", "align": "center" }
                    ],
                    "rows": [
                        {
                            "id": 1,
                            "data": { "name": "Ada", "email": "ada@example.com", "role": "Admin" }
                        }
                    ],
                    "striped": true
                }
            }
        },
        "showTools": true,
        "showDebug": false
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}
