//! Domain configuration loaded from TOML.
//!
//! ```toml
//! [[domain]]
//! alias = "patient"
//! cache = "device"
//!
//! [[domain.binding]]
//! action = "get"
//! input = "patient"
//! output = "patientSummary"
//!
//! [[model]]
//! alias = "patientSummary"
//! maps_to = "patient"
//!
//! [[model.param]]
//! name = "displayName"
//! kind = "string"
//! maps_to = "/name"
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::command::Action;
use crate::domain::{
    ActionBinding, CachePolicy, DomainConfigProvider, FLOW_MODEL_ALIAS, LabelConfig, ModelConfig,
    ModelDef, ParamConfig, RootDomain, StateKind, StateType,
};
use crate::error::RuntimeError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DomainFile {
    #[serde(default, rename = "domain")]
    domains: Vec<DomainEntry>,
    #[serde(default, rename = "model")]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DomainEntry {
    alias: String,
    #[serde(default)]
    cache: CachePolicy,
    #[serde(default, rename = "binding")]
    bindings: Vec<BindingEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BindingEntry {
    action: Action,
    input: String,
    /// Defaults to `input`.
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelEntry {
    alias: String,
    #[serde(rename = "type")]
    type_name: Option<String>,
    maps_to: Option<String>,
    #[serde(default, rename = "param")]
    params: Vec<ParamEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamEntry {
    name: String,
    kind: Option<StateKind>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    maps_to: Option<String>,
    default: Option<Value>,
    schema: Option<Value>,
    #[serde(default, rename = "label")]
    labels: Vec<LabelConfig>,
    #[serde(default, rename = "param")]
    params: Vec<ParamEntry>,
}

impl ParamEntry {
    fn into_config(self) -> ParamConfig {
        let kind = match self.kind {
            Some(kind) => kind,
            None if !self.params.is_empty() => StateKind::Object,
            None => StateKind::Any,
        };
        let mut state_type = match self.type_name {
            Some(name) => StateType::named(name, kind),
            None => StateType::of(kind),
        };
        state_type.schema = self.schema;
        ParamConfig {
            name: self.name,
            state_type,
            maps_to: self.maps_to,
            default: self.default,
            labels: self.labels,
            params: self
                .params
                .into_iter()
                .map(|p| Arc::new(p.into_config()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct DeclaredModel {
    def: Arc<ModelDef>,
    /// Alias of the core model this view projects.
    maps_to: Option<String>,
}

/// Parsed domain configuration; implements [`DomainConfigProvider`].
#[derive(Debug, Clone, Default)]
pub struct DomainConfig {
    roots: BTreeMap<String, RootDomain>,
    models: HashMap<String, DeclaredModel>,
}

impl DomainConfig {
    /// Parse TOML without checking cross references; see [`DomainConfig::validate`].
    pub fn parse(contents: &str) -> Result<Self> {
        let file: DomainFile = toml::from_str(contents).context("parse domain config toml")?;

        let mut roots = BTreeMap::new();
        for entry in file.domains {
            let mut bindings = BTreeMap::new();
            for binding in entry.bindings {
                let output = binding.output.unwrap_or_else(|| binding.input.clone());
                let previous = bindings.insert(
                    binding.action,
                    ActionBinding {
                        input: binding.input,
                        output,
                    },
                );
                if previous.is_some() {
                    bail!(
                        "domain '{}' binds action '{}' more than once",
                        entry.alias,
                        binding.action
                    );
                }
            }
            let root = RootDomain {
                alias: entry.alias.clone(),
                cache: entry.cache,
                bindings,
            };
            if roots.insert(entry.alias.clone(), root).is_some() {
                bail!("duplicate domain alias '{}'", entry.alias);
            }
        }

        let mut models = HashMap::new();
        for entry in file.models {
            let alias = entry.alias.clone();
            let def = ModelDef {
                type_name: entry.type_name.unwrap_or_else(|| entry.alias.clone()),
                alias: entry.alias,
                params: entry
                    .params
                    .into_iter()
                    .map(|p| Arc::new(p.into_config()))
                    .collect(),
            };
            let declared = DeclaredModel {
                def: Arc::new(def),
                maps_to: entry.maps_to,
            };
            if models.insert(alias.clone(), declared).is_some() {
                bail!("duplicate model alias '{alias}'");
            }
        }

        Ok(Self { roots, models })
    }

    /// Cross-reference problems, one message each. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.models.contains_key(FLOW_MODEL_ALIAS) {
            errors.push(format!("missing flow model '{FLOW_MODEL_ALIAS}'"));
        }

        for root in self.roots.values() {
            for (action, binding) in &root.bindings {
                for model in [&binding.input, &binding.output] {
                    if !self.models.contains_key(model) {
                        errors.push(format!(
                            "domain '{}' action '{}' references unknown model '{}'",
                            root.alias, action, model
                        ));
                    }
                }
            }
        }

        let mut aliases: Vec<&String> = self.models.keys().collect();
        aliases.sort();
        for alias in aliases {
            let model = &self.models[alias];
            check_param_names(alias, "", &model.def.params, &mut errors);
            let Some(core_alias) = &model.maps_to else {
                if let Some(path) = first_mapped_param(&model.def.params, "") {
                    errors.push(format!(
                        "model '{alias}' param {path} has maps_to but the model maps to nothing"
                    ));
                }
                continue;
            };
            let Some(core) = self.models.get(core_alias) else {
                errors.push(format!(
                    "model '{alias}' maps to unknown model '{core_alias}'"
                ));
                continue;
            };
            if core.maps_to.is_some() {
                errors.push(format!(
                    "model '{alias}' maps to '{core_alias}', which is itself a view"
                ));
                continue;
            }
            check_mapped_paths(alias, &core.def, &model.def.params, "", &mut errors);
        }

        errors
    }

    pub fn root_aliases(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    fn declared(&self, alias: &str) -> crate::error::Result<&DeclaredModel> {
        self.models
            .get(alias)
            .ok_or_else(|| RuntimeError::Configuration(format!("no model '{alias}'")))
    }
}

impl DomainConfigProvider for DomainConfig {
    fn root_domain(&self, alias: &str) -> crate::error::Result<&RootDomain> {
        self.roots
            .get(alias)
            .ok_or_else(|| RuntimeError::Configuration(format!("no root domain '{alias}'")))
    }

    fn action_binding(&self, root_alias: &str, action: Action) -> crate::error::Result<&ActionBinding> {
        self.root_domain(root_alias)?
            .bindings
            .get(&action)
            .ok_or_else(|| {
                RuntimeError::Configuration(format!(
                    "root domain '{root_alias}' has no binding for '{action}'"
                ))
            })
    }

    fn model(&self, alias: &str) -> crate::error::Result<ModelConfig> {
        let declared = self.declared(alias)?;
        let Some(core_alias) = &declared.maps_to else {
            return Ok(ModelConfig::Plain(Arc::clone(&declared.def)));
        };
        let core = self.models.get(core_alias).ok_or_else(|| {
            RuntimeError::Configuration(format!(
                "model '{alias}' maps to unknown model '{core_alias}'"
            ))
        })?;
        if core.maps_to.is_some() {
            return Err(RuntimeError::Configuration(format!(
                "model '{alias}' maps to '{core_alias}', which is itself a view"
            )));
        }
        Ok(ModelConfig::Mapped {
            view: Arc::clone(&declared.def),
            core: Arc::clone(&core.def),
        })
    }

    fn flow_model(&self) -> crate::error::Result<Arc<ModelDef>> {
        match self.model(FLOW_MODEL_ALIAS)? {
            ModelConfig::Plain(def) => Ok(def),
            ModelConfig::Mapped { .. } => Err(RuntimeError::Configuration(format!(
                "flow model '{FLOW_MODEL_ALIAS}' must not map to another model"
            ))),
        }
    }
}

/// Load, parse and validate a domain config file.
pub fn load_domain_config(path: &Path) -> Result<DomainConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read domain config {}", path.display()))?;
    let config = DomainConfig::parse(&contents)
        .with_context(|| format!("parse domain config {}", path.display()))?;
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(anyhow!(
            "domain config {} invalid: {}",
            path.display(),
            errors.join("; ")
        ));
    }
    debug!(
        path = %path.display(),
        domains = config.roots.len(),
        models = config.models.len(),
        "domain config loaded"
    );
    Ok(config)
}

fn check_param_names(alias: &str, prefix: &str, params: &[Arc<ParamConfig>], errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for param in params {
        let path = format!("{prefix}/{}", param.name);
        if param.name.is_empty() || param.name.contains('/') {
            errors.push(format!("model '{alias}' has invalid param name at {path}"));
        }
        if !seen.insert(param.name.as_str()) {
            errors.push(format!("model '{alias}' declares {path} more than once"));
        }
        check_param_names(alias, &path, &param.params, errors);
    }
}

fn first_mapped_param(params: &[Arc<ParamConfig>], prefix: &str) -> Option<String> {
    params.iter().find_map(|param| {
        let path = format!("{prefix}/{}", param.name);
        if param.maps_to.is_some() {
            Some(path)
        } else {
            first_mapped_param(&param.params, &path)
        }
    })
}

fn check_mapped_paths(
    alias: &str,
    core: &ModelDef,
    params: &[Arc<ParamConfig>],
    prefix: &str,
    errors: &mut Vec<String>,
) {
    for param in params {
        let path = format!("{prefix}/{}", param.name);
        if let Some(target) = &param.maps_to {
            if !model_has_path(core, target) {
                errors.push(format!(
                    "model '{alias}' param {path} maps to missing path {target} of '{}'",
                    core.alias
                ));
            }
        }
        check_mapped_paths(alias, core, &param.params, &path, errors);
    }
}

fn model_has_path(model: &ModelDef, path: &str) -> bool {
    let mut params = &model.params;
    let mut found = false;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match params.iter().find(|p| p.name == segment) {
            Some(param) => {
                params = &param.params;
                found = true;
            }
            None => return false,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SAMPLE_DOMAIN;
    use serde_json::json;

    fn sample() -> DomainConfig {
        DomainConfig::parse(SAMPLE_DOMAIN).expect("parse sample")
    }

    #[test]
    fn sample_domain_is_valid() {
        let config = sample();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert_eq!(config.root_aliases().collect::<Vec<_>>(), ["patient", "visit"]);
    }

    #[test]
    fn parse_reads_params_defaults_schema_and_labels() {
        let config = sample();
        let ModelConfig::Plain(patient) = config.model("patient").expect("patient") else {
            panic!("patient should be plain");
        };
        let status = patient
            .params
            .iter()
            .find(|p| p.name == "status")
            .expect("status");
        assert_eq!(status.default, Some(json!("active")));
        assert_eq!(status.state_type.kind, StateKind::String);

        let age = patient.params.iter().find(|p| p.name == "age").expect("age");
        assert_eq!(age.state_type.schema, Some(json!({"type": "integer", "minimum": 0})));

        let name = patient.params.iter().find(|p| p.name == "name").expect("name");
        assert_eq!(name.labels[0].text, "Name");

        let address = patient
            .params
            .iter()
            .find(|p| p.name == "address")
            .expect("address");
        assert!(address.is_nested());
        assert_eq!(address.state_type.name, "Address");
        assert_eq!(address.state_type.kind, StateKind::Object);
    }

    #[test]
    fn model_resolves_mapping_to_core() {
        let config = sample();
        let resolved = config.model("patientSummary").expect("summary");
        assert!(resolved.is_mapped());
        assert_eq!(resolved.core().alias, "patient");
        assert_eq!(resolved.view().map(|v| v.alias.as_str()), Some("patientSummary"));
    }

    #[test]
    fn lookups_fail_with_configuration_errors() {
        let config = sample();
        assert!(config.root_domain("billing").expect_err("root").is_configuration());
        assert!(
            config
                .action_binding("visit", Action::Delete)
                .expect_err("binding")
                .is_configuration()
        );
        assert!(config.model("nope").expect_err("model").is_configuration());
    }

    #[test]
    fn binding_output_defaults_to_input() {
        let config = DomainConfig::parse(
            r#"
            [[domain]]
            alias = "note"
            [[domain.binding]]
            action = "fetch"
            input = "note"
            "#,
        )
        .expect("parse");
        let binding = config.action_binding("note", Action::Get).expect("binding");
        assert_eq!(binding.output, "note");
        assert_eq!(config.root_domain("note").expect("root").cache, CachePolicy::None);
    }

    #[test]
    fn parse_rejects_duplicate_binding() {
        let err = DomainConfig::parse(
            r#"
            [[domain]]
            alias = "note"
            [[domain.binding]]
            action = "get"
            input = "note"
            [[domain.binding]]
            action = "fetch"
            input = "note"
            "#,
        )
        .expect_err("duplicate");
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn validate_reports_broken_references() {
        let config = DomainConfig::parse(
            r#"
            [[domain]]
            alias = "note"
            [[domain.binding]]
            action = "get"
            input = "note"
            output = "noteView"

            [[model]]
            alias = "note"
            [[model.param]]
            name = "body"
            kind = "string"

            [[model]]
            alias = "noteView"
            maps_to = "note"
            [[model.param]]
            name = "text"
            maps_to = "/title"

            [[model]]
            alias = "noteViewView"
            maps_to = "noteView"
            "#,
        )
        .expect("parse");
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("missing flow model")));
        assert!(errors.iter().any(|e| e.contains("missing path /title")));
        assert!(errors.iter().any(|e| e.contains("itself a view")));
        assert!(config.model("noteViewView").expect_err("view of view").is_configuration());
    }

    #[test]
    fn load_domain_config_fails_on_invalid_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("domain.toml");
        fs::write(&path, "[[domain]]\nalias = \"x\"\n").expect("write");
        let err = load_domain_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("missing flow model"));

        fs::write(&path, SAMPLE_DOMAIN).expect("write");
        load_domain_config(&path).expect("valid");
    }
}
