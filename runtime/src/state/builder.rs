//! State model builder: materializes core/view/flow trees for a command.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::command::{Action, Command};
use crate::domain::ModelDef;
use crate::error::{Result, RuntimeError};
use crate::state::gateway::{ParamStateGateway, ValidatorProvider};
use crate::state::param::{ParamRef, ParamTree, TreeKind};
use crate::state::quad::ExecutionState;

/// Models to materialize for one command.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub core: Arc<ModelDef>,
    pub view: Option<Arc<ModelDef>>,
    pub flow: Arc<ModelDef>,
}

/// Collaborators passed through to the state builder.
#[derive(Clone)]
pub struct StateBuilderSupport {
    pub validator: Arc<dyn ValidatorProvider>,
    pub gateway: Arc<dyn ParamStateGateway>,
}

impl StateBuilderSupport {
    /// Validate every leaf of one tree. A tree that is absent passes.
    pub fn validate_tree(&self, state: &ExecutionState, kind: TreeKind) -> Result<()> {
        let Some(tree) = state.tree(kind) else {
            return Ok(());
        };
        for (id, param) in tree.iter() {
            if param.is_nested() {
                continue;
            }
            let value = state.leaf_state(ParamRef { tree: kind, id })?;
            self.validator.validate(param.path(), param.config(), &value)?;
        }
        Ok(())
    }
}

/// Pre-existing state to seed trees with instead of defaults or persisted state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialExecutionState {
    pub core: Option<Value>,
    pub view: Option<Value>,
    pub flow: Option<Value>,
}

pub trait StateModelBuilder: Send + Sync {
    fn build_exec(
        &self,
        cmd: &Command,
        support: &StateBuilderSupport,
        initial: InitialExecutionState,
        config: &ExecConfig,
    ) -> Result<ExecutionState>;
}

/// Builds trees from configuration and seeds core state from the gateway.
///
/// Core seed precedence: explicit initial state, then persisted state for
/// commands that address an existing entity (`ref_id` set, action neither
/// create nor transient), then declared defaults. A persisted entity that does
/// not exist is a lookup error.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStateBuilder;

impl StateModelBuilder for DefaultStateBuilder {
    #[instrument(skip_all, fields(core = %config.core.alias, mapped = config.view.is_some()))]
    fn build_exec(
        &self,
        cmd: &Command,
        support: &StateBuilderSupport,
        initial: InitialExecutionState,
        config: &ExecConfig,
    ) -> Result<ExecutionState> {
        let core = ParamTree::build(TreeKind::Core, &config.core);
        let view = match &config.view {
            Some(view_model) => Some(link_view(
                ParamTree::build(TreeKind::View, view_model),
                &core,
            )?),
            None => None,
        };
        let flow = ParamTree::build(TreeKind::Flow, &config.flow);
        let mut state = ExecutionState::new(core, view, flow);

        let core_seed = match initial.core {
            Some(seed) => Some(seed),
            None => load_persisted(cmd, support)?,
        };
        if let Some(seed) = core_seed {
            state.set_state(ParamRef::root(TreeKind::Core), seed)?;
        }
        if let Some(seed) = initial.view {
            if state.view().is_some() {
                state.set_state(ParamRef::root(TreeKind::View), seed)?;
            }
        }
        if let Some(seed) = initial.flow {
            state.set_state(ParamRef::root(TreeKind::Flow), seed)?;
        }

        support.validate_tree(&state, TreeKind::Core)?;
        debug!(params = state.core().len(), "execution state built");
        Ok(state)
    }
}

fn load_persisted(cmd: &Command, support: &StateBuilderSupport) -> Result<Option<Value>> {
    let Some(ref_id) = cmd.ref_id() else {
        return Ok(None);
    };
    if matches!(cmd.action(), Action::New | Action::Search | Action::Config) {
        return Ok(None);
    }
    let persisted = support.gateway.load(cmd.root_alias(), ref_id)?;
    match persisted {
        Some(value) => Ok(Some(value)),
        None => Err(RuntimeError::Lookup(format!(
            "no persisted state for {}",
            cmd.root_domain_uri()
        ))),
    }
}

/// Point each mapped view param at its core counterpart.
fn link_view(mut view: ParamTree, core: &ParamTree) -> Result<ParamTree> {
    let mut links = Vec::new();
    for (id, param) in view.iter() {
        let Some(target) = &param.config().maps_to else {
            continue;
        };
        let core_id = core.find(target).ok_or_else(|| {
            RuntimeError::Configuration(format!(
                "view param {} of '{}' maps to missing core path {} of '{}'",
                param.path(),
                view.model_alias(),
                target,
                core.model_alias()
            ))
        })?;
        links.push((id, core_id));
    }
    for (id, core_id) in links {
        view.link(id, core_id);
    }
    Ok(view)
}
