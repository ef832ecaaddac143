use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde_json::{json, Value};

/// Turns a type's JSON Schema into text an LLM can follow.
pub trait SchemaDocumentation: Send + Sync {
    fn document(&self, type_name: &str, schema: &RootSchema) -> String;
}

/// Pretty-printed schema with every subschema inlined, so the reader never
/// has to chase `$ref`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineJsonSchemaDocs;

impl SchemaDocumentation for InlineJsonSchemaDocs {
    fn document(&self, type_name: &str, schema: &RootSchema) -> String {
        serde_json::to_string_pretty(schema).unwrap_or_else(|err| {
            tracing::warn!(type_name, error = %err, "failed to render schema documentation");
            json!({ "error": format!("Schema for {type_name} not found") }).to_string()
        })
    }
}

pub fn inline_schema_for<T: JsonSchema>() -> RootSchema {
    SchemaSettings::draft07()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>()
}

/// Schema as a plain JSON value, for `inputSchema` fields.
pub fn schema_value(schema: &RootSchema) -> Value {
    serde_json::to_value(schema).unwrap_or_else(|_| json!({ "type": "object" }))
}

#[cfg(test)]
mod tests {
    use schemars::JsonSchema;

    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Inner {
        kind: String,
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Outer {
        inner: Inner,
        label: Option<String>,
    }

    #[test]
    fn subschemas_are_inlined() {
        let schema = inline_schema_for::<Outer>();
        let text = InlineJsonSchemaDocs.document("Outer", &schema);
        assert!(!text.contains("$ref"));
        assert!(text.contains("\"kind\""));

        let value = schema_value(&schema);
        assert_eq!(value["properties"]["inner"]["type"], "object");
    }
}
