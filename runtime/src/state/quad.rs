//! The materialized state graph for one entity instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, RuntimeError};
use crate::state::param::{Param, ParamRef, ParamTree, TreeKind};

/// Core, optional view, and flow trees of one entity instance.
///
/// When `view` is present every mapped view param points at exactly one core
/// param; reads and writes through a mapped view param go to that core param.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    core: ParamTree,
    view: Option<ParamTree>,
    flow: ParamTree,
}

impl ExecutionState {
    pub(crate) fn new(core: ParamTree, view: Option<ParamTree>, flow: ParamTree) -> Self {
        Self { core, view, flow }
    }

    pub fn core(&self) -> &ParamTree {
        &self.core
    }

    pub fn view(&self) -> Option<&ParamTree> {
        self.view.as_ref()
    }

    pub fn flow(&self) -> &ParamTree {
        &self.flow
    }

    pub fn tree(&self, kind: TreeKind) -> Option<&ParamTree> {
        match kind {
            TreeKind::Core => Some(&self.core),
            TreeKind::View => self.view.as_ref(),
            TreeKind::Flow => Some(&self.flow),
        }
    }

    fn tree_mut(&mut self, kind: TreeKind) -> Option<&mut ParamTree> {
        match kind {
            TreeKind::Core => Some(&mut self.core),
            TreeKind::View => self.view.as_mut(),
            TreeKind::Flow => Some(&mut self.flow),
        }
    }

    /// Tree commands address: the view when present, otherwise the core.
    pub fn entity_tree(&self) -> TreeKind {
        if self.view.is_some() {
            TreeKind::View
        } else {
            TreeKind::Core
        }
    }

    pub fn param(&self, at: ParamRef) -> Result<&Param> {
        self.tree(at.tree)
            .and_then(|tree| tree.get(at.id))
            .ok_or_else(|| RuntimeError::Lookup(format!("no param {:?}", at)))
    }

    /// Find a param by path within one tree.
    pub fn find(&self, tree: TreeKind, path: &str) -> Option<ParamRef> {
        self.tree(tree)
            .and_then(|t| t.find(path))
            .map(|id| ParamRef { tree, id })
    }

    /// Fully resolved state of a param.
    ///
    /// Mapped view params read through to core; containers compose an object
    /// from their children keyed by param name.
    pub fn leaf_state(&self, at: ParamRef) -> Result<Value> {
        let param = self.param(at)?;
        if let (TreeKind::View, Some(core_id)) = (at.tree, param.maps_to()) {
            return self.leaf_state(ParamRef {
                tree: TreeKind::Core,
                id: core_id,
            });
        }
        if param.is_nested() {
            let mut object = Map::new();
            for &child in param.children() {
                let child_ref = ParamRef {
                    tree: at.tree,
                    id: child,
                };
                let name = self.param(child_ref)?.config().name.clone();
                object.insert(name, self.leaf_state(child_ref)?);
            }
            return Ok(Value::Object(object));
        }
        self.tree(at.tree)
            .and_then(|tree| tree.stored_state(at.id))
            .cloned()
            .ok_or_else(|| RuntimeError::Lookup(format!("no param {:?}", at)))
    }

    /// Deserialize a param's state into its typed form.
    pub fn state_as<T: DeserializeOwned>(&self, at: ParamRef) -> Result<T> {
        let param = self.param(at)?;
        let type_name = param.config().state_type.name.clone();
        let value = self.leaf_state(at)?;
        serde_json::from_value(value).map_err(|err| RuntimeError::Conversion {
            type_name,
            reason: err.to_string(),
        })
    }

    /// Replace a param's state.
    ///
    /// Containers take an object (or null) and distribute it over their
    /// children; fields with no matching child are ignored and children with
    /// no matching field are reset to null. Only the addressed subtree changes,
    /// and nothing changes unless every affected param accepts its value.
    pub fn set_state(&mut self, at: ParamRef, value: Value) -> Result<()> {
        let mut writes = Vec::new();
        self.plan_state(at, value, &mut writes)?;
        for (target, value) in writes {
            if let Some(tree) = self.tree_mut(target.tree) {
                tree.set_stored_state(target.id, value);
            }
        }
        Ok(())
    }

    /// Kind-check `value` against `at` and collect the leaf writes it implies.
    fn plan_state(&self, at: ParamRef, value: Value, writes: &mut Vec<(ParamRef, Value)>) -> Result<()> {
        let param = self.param(at)?;
        if let (TreeKind::View, Some(core_id)) = (at.tree, param.maps_to()) {
            return self.plan_state(
                ParamRef {
                    tree: TreeKind::Core,
                    id: core_id,
                },
                value,
                writes,
            );
        }
        let state_type = &param.config().state_type;
        if !state_type.kind.accepts(&value) {
            return Err(RuntimeError::Conversion {
                type_name: state_type.name.clone(),
                reason: format!("state for {} does not match declared kind", param.path()),
            });
        }
        if !param.is_nested() {
            writes.push((at, value));
            return Ok(());
        }

        let mut fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for &child in param.children() {
            let child_ref = ParamRef {
                tree: at.tree,
                id: child,
            };
            let name = &self.param(child_ref)?.config().name;
            let child_value = fields.remove(name).unwrap_or(Value::Null);
            self.plan_state(child_ref, child_value, writes)?;
        }
        Ok(())
    }
}

/// Lifecycle flag for the live resources behind a QuadModel.
#[derive(Debug)]
pub struct ExecutionRuntime {
    running: AtomicBool,
}

impl ExecutionRuntime {
    fn started() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the runtime. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}

/// Root of the materialized state graph for one entity instance.
#[derive(Debug)]
pub struct QuadModel {
    root_alias: String,
    state: RwLock<ExecutionState>,
    runtime: ExecutionRuntime,
}

impl QuadModel {
    pub fn new(root_alias: impl Into<String>, state: ExecutionState) -> Self {
        let root_alias = root_alias.into();
        debug!(root = %root_alias, mapped = state.view.is_some(), "quad model started");
        Self {
            root_alias,
            state: RwLock::new(state),
            runtime: ExecutionRuntime::started(),
        }
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ExecutionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ExecutionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn runtime(&self) -> &ExecutionRuntime {
        &self.runtime
    }

    /// Stop the runtime, logging the first transition only.
    pub fn stop(&self) {
        if self.runtime.stop() {
            debug!(root = %self.root_alias, "quad model stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelDef, ParamConfig, StateKind, StateType};
    use serde::Deserialize;
    use serde_json::json;

    fn core_model() -> ModelDef {
        ModelDef::new(
            "patient",
            vec![
                ParamConfig::leaf("name", StateType::of(StateKind::String)),
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

    fn view_model() -> ModelDef {
        let mut full_name = ParamConfig::leaf("fullName", StateType::of(StateKind::String));
        full_name.maps_to = Some("/name".to_string());
        ModelDef::new(
            "patientView",
            vec![
                full_name,
                ParamConfig::leaf("note", StateType::of(StateKind::String)),
            ],
        )
    }

    fn state() -> ExecutionState {
        let core = ParamTree::build(TreeKind::Core, &core_model());
        let mut view = ParamTree::build(TreeKind::View, &view_model());
        let full_name = view.find("/fullName").expect("fullName");
        let name = core.find("/name").expect("name");
        view.link(full_name, name);
        let flow = ParamTree::build(TreeKind::Flow, &ModelDef::new("processFlow", Vec::new()));
        ExecutionState::new(core, Some(view), flow)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Address {
        city: Option<String>,
        zip: Option<String>,
    }

    #[test]
    fn container_state_composes_children() {
        let mut state = state();
        let address = state.find(TreeKind::Core, "/address").expect("address");
        state
            .set_state(address, json!({"city": "Springfield", "extra": 1}))
            .expect("set");

        assert_eq!(
            state.leaf_state(address).expect("state"),
            json!({"city": "Springfield", "zip": null})
        );
        let typed: Address = state.state_as(address).expect("typed");
        assert_eq!(
            typed,
            Address {
                city: Some("Springfield".to_string()),
                zip: None
            }
        );
    }

    #[test]
    fn mapped_view_param_reads_and_writes_core() {
        let mut state = state();
        let full_name = state.find(TreeKind::View, "/fullName").expect("fullName");
        state.set_state(full_name, json!("Ada")).expect("set");

        let name = state.find(TreeKind::Core, "/name").expect("name");
        assert_eq!(state.leaf_state(name).expect("core"), json!("Ada"));
        assert_eq!(state.leaf_state(full_name).expect("view"), json!("Ada"));
        assert_eq!(state.entity_tree(), TreeKind::View);
    }

    #[test]
    fn set_state_rejects_kind_mismatch() {
        let mut state = state();
        let name = state.find(TreeKind::Core, "/name").expect("name");
        let err = state.set_state(name, json!(42)).expect_err("mismatch");
        assert!(matches!(err, RuntimeError::Conversion { .. }));
    }

    #[test]
    fn runtime_stop_is_idempotent() {
        let quad = QuadModel::new("patient", state());
        assert!(quad.runtime().is_running());
        assert!(quad.runtime().stop());
        assert!(!quad.runtime().stop());
        assert!(!quad.runtime().is_running());
    }

    #[test]
    fn container_write_is_all_or_nothing() {
        let mut state = state();
        let address = state.find(TreeKind::Core, "/address").expect("address");
        state
            .set_state(address, json!({"city": "Springfield", "zip": "01101"}))
            .expect("set");

        let err = state
            .set_state(address, json!({"city": "Shelbyville", "zip": 5}))
            .expect_err("zip kind");
        assert!(matches!(err, RuntimeError::Conversion { .. }));
        assert_eq!(
            state.leaf_state(address).expect("state"),
            json!({"city": "Springfield", "zip": "01101"})
        );
    }
}
