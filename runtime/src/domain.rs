//! Resolved domain configuration consumed by the builders and the loader.
//!
//! How configuration is authored is out of scope here; [`crate::io::domain_config`]
//! loads one TOML shape into these types, and anything else can implement
//! [`DomainConfigProvider`] directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::Action;
use crate::error::Result;

/// Alias of the singleton process-flow model.
pub const FLOW_MODEL_ALIAS: &str = "processFlow";

/// Coarse JSON shape a param's state must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl StateKind {
    /// Null is accepted for every kind (unset state).
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (StateKind::Any, _) => true,
            (StateKind::String, Value::String(_)) => true,
            (StateKind::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (StateKind::Number, Value::Number(_)) => true,
            (StateKind::Boolean, Value::Bool(_)) => true,
            (StateKind::Object, Value::Object(_)) => true,
            (StateKind::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

/// Declared runtime type a param's state must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct StateType {
    pub name: String,
    pub kind: StateKind,
    /// Optional JSON Schema checked by [`crate::state::gateway::SchemaValidator`].
    pub schema: Option<Value>,
}

impl StateType {
    pub fn of(kind: StateKind) -> Self {
        let name = match kind {
            StateKind::String => "string",
            StateKind::Integer => "integer",
            StateKind::Number => "number",
            StateKind::Boolean => "boolean",
            StateKind::Object => "object",
            StateKind::Array => "array",
            StateKind::Any => "any",
        };
        Self {
            name: name.to_string(),
            kind,
            schema: None,
        }
    }

    pub fn named(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            schema: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub locale: String,
    pub text: String,
}

/// Static configuration of one param.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamConfig {
    pub name: String,
    pub state_type: StateType,
    /// View params only: path of the core param this one projects.
    pub maps_to: Option<String>,
    pub default: Option<Value>,
    pub labels: Vec<LabelConfig>,
    /// Non-empty for nested (container) params.
    pub params: Vec<Arc<ParamConfig>>,
}

impl ParamConfig {
    pub fn leaf(name: impl Into<String>, state_type: StateType) -> Self {
        Self {
            name: name.into(),
            state_type,
            maps_to: None,
            default: None,
            labels: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn nested(
        name: impl Into<String>,
        type_name: impl Into<String>,
        params: Vec<ParamConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            state_type: StateType::named(type_name, StateKind::Object),
            maps_to: None,
            default: None,
            labels: Vec::new(),
            params: params.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn is_nested(&self) -> bool {
        !self.params.is_empty()
    }
}

/// One declared model: a named set of params.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDef {
    pub alias: String,
    pub type_name: String,
    pub params: Vec<Arc<ParamConfig>>,
}

impl ModelDef {
    pub fn new(alias: impl Into<String>, params: Vec<ParamConfig>) -> Self {
        let alias = alias.into();
        Self {
            type_name: alias.clone(),
            alias,
            params: params.into_iter().map(Arc::new).collect(),
        }
    }

    /// Synthetic config for the root param of a tree built from this model.
    pub fn root_param(&self) -> ParamConfig {
        ParamConfig {
            name: self.alias.clone(),
            state_type: StateType::named(self.type_name.clone(), StateKind::Object),
            maps_to: None,
            default: None,
            labels: Vec::new(),
            params: self.params.clone(),
        }
    }
}

/// A model bound to an action: either a plain core model or a view mapped onto one.
#[derive(Debug, Clone)]
pub enum ModelConfig {
    Plain(Arc<ModelDef>),
    Mapped {
        view: Arc<ModelDef>,
        core: Arc<ModelDef>,
    },
}

impl ModelConfig {
    pub fn is_mapped(&self) -> bool {
        matches!(self, ModelConfig::Mapped { .. })
    }

    pub fn core(&self) -> &Arc<ModelDef> {
        match self {
            ModelConfig::Plain(core) | ModelConfig::Mapped { core, .. } => core,
        }
    }

    pub fn view(&self) -> Option<&Arc<ModelDef>> {
        match self {
            ModelConfig::Plain(_) => None,
            ModelConfig::Mapped { view, .. } => Some(view),
        }
    }
}

/// Persistence policy deciding session affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    #[default]
    None,
    /// Live state is reused across requests within a session.
    Device,
}

/// Models used for an action's input and output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBinding {
    pub input: String,
    pub output: String,
}

impl ActionBinding {
    /// Create uses the input model; every other action the output model.
    pub fn model_for(&self, action: Action) -> &str {
        if action == Action::New {
            &self.input
        } else {
            &self.output
        }
    }
}

/// A root domain entity with its persistence policy and action bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct RootDomain {
    pub alias: String,
    pub cache: CachePolicy,
    pub bindings: BTreeMap<Action, ActionBinding>,
}

/// Lookup surface over resolved domain configuration.
///
/// Every lookup is a configuration error on miss; nothing defaults silently.
pub trait DomainConfigProvider: Send + Sync {
    fn root_domain(&self, alias: &str) -> Result<&RootDomain>;

    fn action_binding(&self, root_alias: &str, action: Action) -> Result<&ActionBinding>;

    /// Resolve a model by alias, following a declared mapping to its core model.
    fn model(&self, alias: &str) -> Result<ModelConfig>;

    fn flow_model(&self) -> Result<Arc<ModelDef>>;
}
