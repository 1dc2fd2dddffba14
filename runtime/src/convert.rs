//! JSON conversion between param state and text.

use serde_json::Value;

use crate::domain::StateType;
use crate::error::{Result, RuntimeError};

/// Object/JSON conversion used by the resolver and the init handler.
pub trait Converter: Send + Sync {
    /// Serialize state to JSON text.
    fn to_json(&self, value: &Value) -> Result<String>;

    /// Parse JSON text into state conforming to `target`.
    fn from_json(&self, target: &StateType, json: &str) -> Result<Value>;
}

/// `serde_json` converter that checks the declared kind of the target type.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    fn to_json(&self, value: &Value) -> Result<String> {
        serde_json::to_string(value).map_err(|err| RuntimeError::Conversion {
            type_name: "json".to_string(),
            reason: err.to_string(),
        })
    }

    fn from_json(&self, target: &StateType, json: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(json).map_err(|err| RuntimeError::Conversion {
            type_name: target.name.clone(),
            reason: err.to_string(),
        })?;
        if !target.kind.accepts(&value) {
            return Err(RuntimeError::Conversion {
                type_name: target.name.clone(),
                reason: format!("expected {:?} but found {}", target.kind, kind_name(&value)),
            });
        }
        Ok(value)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StateKind;
    use serde_json::json;

    #[test]
    fn from_json_accepts_matching_kind() {
        let address = StateType::named("Address", StateKind::Object);
        let value = JsonConverter
            .from_json(&address, r#"{"city":"X"}"#)
            .expect("convert");
        assert_eq!(value, json!({"city": "X"}));
    }

    #[test]
    fn from_json_rejects_wrong_kind_and_bad_text() {
        let address = StateType::named("Address", StateKind::Object);
        let err = JsonConverter.from_json(&address, "[1,2]").expect_err("kind");
        assert!(err.to_string().contains("found array"));
        assert!(JsonConverter.from_json(&address, "{city").is_err());
    }

    #[test]
    fn to_json_is_compact() {
        let text = JsonConverter.to_json(&json!({"a": [1, 2]})).expect("json");
        assert_eq!(text, r#"{"a":[1,2]}"#);
    }
}
