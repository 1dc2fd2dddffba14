//! Param arena for one state tree.
//!
//! Each tree owns its params in a `Vec`, indexed by path. Parents and children
//! refer to each other by [`ParamId`]; a view param refers into the core arena
//! the same way, so no node ever owns another tree's node.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{ModelDef, ParamConfig};
use crate::error::{Result, RuntimeError};

/// Index of a param within its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(usize);

impl ParamId {
    pub const ROOT: ParamId = ParamId(0);
}

/// Which tree of an execution state a param lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeKind {
    Core,
    View,
    Flow,
}

/// Cross-tree param handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub tree: TreeKind,
    pub id: ParamId,
}

impl ParamRef {
    pub fn root(tree: TreeKind) -> Self {
        Self {
            tree,
            id: ParamId::ROOT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelState {
    pub locale: String,
    pub text: String,
}

/// One addressable node of a state tree.
#[derive(Debug, Clone)]
pub struct Param {
    path: String,
    config: Arc<ParamConfig>,
    parent: Option<ParamId>,
    children: Vec<ParamId>,
    state: Value,
    labels: Vec<LabelState>,
    maps_to: Option<ParamId>,
}

impl Param {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &ParamConfig {
        &self.config
    }

    pub fn parent(&self) -> Option<ParamId> {
        self.parent
    }

    pub fn children(&self) -> &[ParamId] {
        &self.children
    }

    pub fn is_nested(&self) -> bool {
        !self.children.is_empty()
    }

    /// Core param this view param projects, if mapped.
    pub fn maps_to(&self) -> Option<ParamId> {
        self.maps_to
    }

    pub fn labels(&self) -> &[LabelState] {
        &self.labels
    }

    /// Label text for `locale`.
    ///
    /// Errors with `Lookup` when no label matches and `AmbiguousState` when
    /// more than one does.
    pub fn label_text(&self, locale: &str) -> Result<&str> {
        if self.labels.is_empty() {
            return Err(RuntimeError::Lookup(format!(
                "no label config for {}",
                self.path
            )));
        }
        let mut matches = self.labels.iter().filter(|label| label.locale == locale);
        let label = matches.next().ok_or_else(|| {
            RuntimeError::Lookup(format!(
                "no label for locale '{}' on {}",
                locale, self.path
            ))
        })?;
        if matches.next().is_some() {
            return Err(RuntimeError::AmbiguousState(format!(
                "more than one label for locale '{}' on {}",
                locale, self.path
            )));
        }
        Ok(&label.text)
    }
}

/// Arena of params materialized from one model.
#[derive(Debug, Clone)]
pub struct ParamTree {
    kind: TreeKind,
    model_alias: String,
    nodes: Vec<Param>,
    index: HashMap<String, ParamId>,
}

impl ParamTree {
    /// Materialize a tree from `model`, seeding leaves with their defaults.
    pub fn build(kind: TreeKind, model: &ModelDef) -> Self {
        let mut tree = Self {
            kind,
            model_alias: model.alias.clone(),
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        tree.push(Arc::new(model.root_param()), "/".to_string(), None);
        tree
    }

    fn push(&mut self, config: Arc<ParamConfig>, path: String, parent: Option<ParamId>) -> ParamId {
        let id = ParamId(self.nodes.len());
        let labels = config
            .labels
            .iter()
            .map(|label| LabelState {
                locale: label.locale.clone(),
                text: label.text.clone(),
            })
            .collect();
        self.nodes.push(Param {
            path: path.clone(),
            config: Arc::clone(&config),
            parent,
            children: Vec::new(),
            state: config.default.clone().unwrap_or(Value::Null),
            labels,
            maps_to: None,
        });
        self.index.insert(path.clone(), id);

        for child in &config.params {
            let child_path = if path == "/" {
                format!("/{}", child.name)
            } else {
                format!("{}/{}", path, child.name)
            };
            let child_id = self.push(Arc::clone(child), child_path, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    pub fn model_alias(&self) -> &str {
        &self.model_alias
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> &Param {
        &self.nodes[ParamId::ROOT.0]
    }

    pub fn get(&self, id: ParamId) -> Option<&Param> {
        self.nodes.get(id.0)
    }

    /// Find a param by path relative to the tree root.
    ///
    /// Leading and trailing slashes are optional; an empty path is the root.
    pub fn find(&self, path: &str) -> Option<ParamId> {
        let trimmed = path.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Some(ParamId::ROOT);
        }
        self.index.get(&format!("/{trimmed}")).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Param)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, param)| (ParamId(idx), param))
    }

    /// Stored value of a leaf param. Containers store nothing of their own.
    pub(crate) fn stored_state(&self, id: ParamId) -> Option<&Value> {
        self.nodes.get(id.0).map(|param| &param.state)
    }

    pub(crate) fn set_stored_state(&mut self, id: ParamId, value: Value) {
        if let Some(param) = self.nodes.get_mut(id.0) {
            param.state = value;
        }
    }

    pub(crate) fn link(&mut self, id: ParamId, core: ParamId) {
        if let Some(param) = self.nodes.get_mut(id.0) {
            param.maps_to = Some(core);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LabelConfig, StateKind, StateType};
    use serde_json::json;

    fn patient() -> ModelDef {
        let mut name = ParamConfig::leaf("name", StateType::of(StateKind::String));
        name.labels = vec![
            LabelConfig {
                locale: "en-US".to_string(),
                text: "Name".to_string(),
            },
            LabelConfig {
                locale: "fr".to_string(),
                text: "Nom".to_string(),
            },
            LabelConfig {
                locale: "fr".to_string(),
                text: "Prénom".to_string(),
            },
        ];
        let mut status = ParamConfig::leaf("status", StateType::of(StateKind::String));
        status.default = Some(json!("active"));
        ModelDef::new(
            "patient",
            vec![
                name,
                status,
                ParamConfig::nested(
                    "address",
                    "Address",
                    vec![
                        ParamConfig::leaf("city", StateType::of(StateKind::String)),
                        ParamConfig::leaf("zip", StateType::of(StateKind::String)),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn build_indexes_nested_paths_depth_first() {
        let tree = ParamTree::build(TreeKind::Core, &patient());
        let paths: Vec<&str> = tree.iter().map(|(_, p)| p.path()).collect();
        assert_eq!(
            paths,
            vec!["/", "/name", "/status", "/address", "/address/city", "/address/zip"]
        );
        let city = tree.find("address/city").expect("city");
        let address = tree.find("/address/").expect("address");
        assert_eq!(tree.get(city).and_then(Param::parent), Some(address));
        assert_eq!(tree.find(""), Some(ParamId::ROOT));
        assert_eq!(tree.find("/missing"), None);
    }

    #[test]
    fn build_seeds_leaf_defaults() {
        let tree = ParamTree::build(TreeKind::Core, &patient());
        let status = tree.find("/status").expect("status");
        assert_eq!(tree.stored_state(status), Some(&json!("active")));
    }

    #[test]
    fn label_text_distinguishes_missing_and_ambiguous() {
        let tree = ParamTree::build(TreeKind::Core, &patient());
        let name = tree.get(tree.find("/name").expect("name")).expect("param");
        assert_eq!(name.label_text("en-US").expect("label"), "Name");
        assert!(matches!(
            name.label_text("fr"),
            Err(RuntimeError::AmbiguousState(_))
        ));
        assert!(matches!(name.label_text("de"), Err(RuntimeError::Lookup(_))));

        let zip = tree.get(tree.find("/address/zip").expect("zip")).expect("param");
        assert!(matches!(zip.label_text("en-US"), Err(RuntimeError::Lookup(_))));
    }
}
