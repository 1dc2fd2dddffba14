//! Persistence and validation collaborators handed to the state builder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tracing::trace;

use crate::domain::ParamConfig;
use crate::error::{Result, RuntimeError};

/// Reads and writes persisted core state for root domain entities.
pub trait ParamStateGateway: Send + Sync {
    /// Persisted core state of `alias:ref_id`, or `None` if never saved.
    fn load(&self, alias: &str, ref_id: &str) -> Result<Option<Value>>;

    fn save(&self, alias: &str, ref_id: &str, state: &Value) -> Result<()>;

    /// Allocate an id for a newly created entity.
    fn next_id(&self, alias: &str) -> Result<String>;
}

/// Checks a param's state against its configuration.
pub trait ValidatorProvider: Send + Sync {
    fn validate(&self, path: &str, config: &ParamConfig, state: &Value) -> Result<()>;
}

/// Process-local gateway; ids are a shared monotonically increasing sequence.
#[derive(Debug, Default)]
pub struct InMemoryParamStateGateway {
    entities: RwLock<HashMap<(String, String), Value>>,
    sequence: AtomicU64,
}

impl InMemoryParamStateGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted entities.
    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ParamStateGateway for InMemoryParamStateGateway {
    fn load(&self, alias: &str, ref_id: &str) -> Result<Option<Value>> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        let found = entities
            .get(&(alias.to_string(), ref_id.to_string()))
            .cloned();
        trace!(alias, ref_id, found = found.is_some(), "gateway load");
        Ok(found)
    }

    fn save(&self, alias: &str, ref_id: &str, state: &Value) -> Result<()> {
        trace!(alias, ref_id, "gateway save");
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((alias.to_string(), ref_id.to_string()), state.clone());
        Ok(())
    }

    fn next_id(&self, _alias: &str) -> Result<String> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(id.to_string())
    }
}

/// Validates state against the optional JSON Schema of the declared type.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

impl ValidatorProvider for SchemaValidator {
    fn validate(&self, path: &str, config: &ParamConfig, state: &Value) -> Result<()> {
        let Some(schema) = &config.state_type.schema else {
            return Ok(());
        };
        if state.is_null() {
            return Ok(());
        }
        let compiled = jsonschema::validator_for(schema).map_err(|err| {
            RuntimeError::Configuration(format!("invalid schema for {path}: {err}"))
        })?;
        let messages: Vec<String> = compiled
            .iter_errors(state)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            return Err(RuntimeError::Validation {
                path: path.to_string(),
                reason: messages.join("; "),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StateKind, StateType};
    use serde_json::json;

    #[test]
    fn gateway_saves_loads_and_allocates_ids() {
        let gateway = InMemoryParamStateGateway::new();
        assert_eq!(gateway.load("patient", "1").expect("load"), None);
        gateway
            .save("patient", "1", &json!({"name": "Ada"}))
            .expect("save");
        assert_eq!(
            gateway.load("patient", "1").expect("load"),
            Some(json!({"name": "Ada"}))
        );
        assert_eq!(gateway.next_id("patient").expect("id"), "1");
        assert_eq!(gateway.next_id("patient").expect("id"), "2");
        assert_eq!(gateway.len(), 1);
    }

    #[test]
    fn schema_validator_reports_violations() {
        let mut config = ParamConfig::leaf("age", StateType::of(StateKind::Integer));
        config.state_type.schema = Some(json!({"type": "integer", "minimum": 0}));

        assert!(SchemaValidator.validate("/age", &config, &json!(4)).is_ok());
        assert!(SchemaValidator.validate("/age", &config, &Value::Null).is_ok());
        let err = SchemaValidator
            .validate("/age", &config, &json!(-1))
            .expect_err("minimum");
        assert!(matches!(err, RuntimeError::Validation { .. }));
    }
}
