use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::graph::XscpData;

static SEMANTIC_RESPONSE_SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
static XSCP_DATA_SCHEMA: OnceLock<JSONSchema> = OnceLock::new();

fn compile_schema(source: &'static str) -> JSONSchema {
    let schema_value: Value =
        serde_json::from_str(source).expect("embedded schema should parse as JSON");
    JSONSchema::options()
        .with_draft(Draft::Draft202012)
        .compile(&schema_value)
        .expect("embedded schema should compile")
}

fn semantic_response_schema() -> &'static JSONSchema {
    SEMANTIC_RESPONSE_SCHEMA
        .get_or_init(|| compile_schema(include_str!("../schema/semantic_response.schema.json")))
}

fn xscp_data_schema() -> &'static JSONSchema {
    XSCP_DATA_SCHEMA.get_or_init(|| compile_schema(include_str!("../schema/xscp_data.schema.json")))
}

/// Every validation error of `value`, one message each. Empty when valid.
fn schema_errors(schema: &JSONSchema, value: &Value) -> Vec<String> {
    match schema.validate(value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|err| {
                let path = err.instance_path.to_string();
                if path.is_empty() {
                    err.to_string()
                } else {
                    format!("{path}: {err}")
                }
            })
            .collect(),
    }
}

fn validate_value(schema: &JSONSchema, value: &Value, label: &str) -> Result<()> {
    let messages = schema_errors(schema, value);
    if !messages.is_empty() {
        let joined = messages.join("\n");
        return Err(anyhow!("{label} failed schema validation:\n{joined}"));
    }
    Ok(())
}

/// Validation errors of a repair-service response; the repair loop feeds
/// them back verbatim in its corrective retry.
pub fn semantic_response_errors(value: &Value) -> Vec<String> {
    schema_errors(semantic_response_schema(), value)
}

pub fn validate_semantic_response_value(value: &Value) -> Result<()> {
    validate_value(semantic_response_schema(), value, "semantic response")
}

/// Validates a `serde_json::Value` against the clipboard document schema.
pub fn validate_xscp_data_value(value: &Value) -> Result<()> {
    validate_value(xscp_data_schema(), value, "clipboard document")
}

/// Validates an emitted [`XscpData`] against the clipboard document schema.
pub fn validate_xscp_data(data: &XscpData) -> Result<()> {
    let value = serde_json::to_value(data)?;
    validate_xscp_data_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_a_complete_response() {
        let value = json!({
            "reasons": ["hero lost its flex centering"],
            "styleFixes": [{
                "className": "hero",
                "category": "layout",
                "variant": null,
                "properties": { "justify-content": "center" },
                "reason": "restore centering"
            }],
            "parentChildFixes": [{
                "action": "add-class",
                "parentClass": null,
                "childClass": "card",
                "addClass": "card-grid",
                "properties": null,
                "reason": "cards need a grid parent"
            }],
            "phantomRemovals": []
        });
        validate_semantic_response_value(&value).expect("response should satisfy schema");
    }

    #[test]
    fn rejects_extra_keys_and_unknown_actions() {
        let value = json!({
            "reasons": [],
            "styleFixes": [],
            "parentChildFixes": [{
                "action": "move-node",
                "parentClass": "a",
                "childClass": "b",
                "addClass": null,
                "properties": null,
                "reason": ""
            }],
            "phantomRemovals": [],
            "confidence": 0.9
        });
        let errors = semantic_response_errors(&value);
        assert!(errors.len() >= 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("/parentChildFixes/0/action")));
    }

    #[test]
    fn rejects_missing_keys_and_wrong_types() {
        let value = json!({
            "reasons": "not a list",
            "styleFixes": [],
            "parentChildFixes": []
        });
        assert!(validate_semantic_response_value(&value).is_err());
    }

    #[test]
    fn empty_document_satisfies_clipboard_schema() {
        validate_xscp_data(&XscpData::default()).expect("default document should satisfy schema");
    }
}
