//! Resolves the core/view/flow models for a command and builds its QuadModel.

use std::sync::Arc;

use tracing::{instrument, trace};

use crate::command::Command;
use crate::domain::{DomainConfigProvider, ModelConfig};
use crate::error::Result;
use crate::state::builder::{
    ExecConfig, InitialExecutionState, StateBuilderSupport, StateModelBuilder,
};
use crate::state::quad::QuadModel;

pub struct QuadModelBuilder {
    domain: Arc<dyn DomainConfigProvider>,
    state_builder: Arc<dyn StateModelBuilder>,
    support: StateBuilderSupport,
}

impl QuadModelBuilder {
    pub fn new(
        domain: Arc<dyn DomainConfigProvider>,
        state_builder: Arc<dyn StateModelBuilder>,
        support: StateBuilderSupport,
    ) -> Self {
        Self {
            domain,
            state_builder,
            support,
        }
    }

    pub fn domain(&self) -> &Arc<dyn DomainConfigProvider> {
        &self.domain
    }

    pub fn support(&self) -> &StateBuilderSupport {
        &self.support
    }

    pub fn build(&self, cmd: &Command) -> Result<QuadModel> {
        self.build_with(cmd, InitialExecutionState::default())
    }

    #[instrument(skip_all, fields(cmd = %cmd))]
    pub fn build_with(&self, cmd: &Command, initial: InitialExecutionState) -> Result<QuadModel> {
        let exec_config = self.resolve_exec_config(cmd)?;
        trace!(
            core = %exec_config.core.alias,
            view = ?exec_config.view.as_ref().map(|v| v.alias.as_str()),
            "resolved exec config"
        );
        let state = self
            .state_builder
            .build_exec(cmd, &self.support, initial, &exec_config)?;
        Ok(QuadModel::new(cmd.root_alias(), state))
    }

    /// Core/view/flow models for `cmd`.
    ///
    /// A mapped model contributes its view and its resolved core; a plain
    /// model is the core and there is no view.
    pub fn resolve_exec_config(&self, cmd: &Command) -> Result<ExecConfig> {
        let model_config = self.find_model_config(cmd)?;
        trace!(mapped = model_config.is_mapped(), "model config found");
        Ok(ExecConfig {
            core: Arc::clone(model_config.core()),
            view: model_config.view().cloned(),
            flow: self.domain.flow_model()?,
        })
    }

    fn find_model_config(&self, cmd: &Command) -> Result<ModelConfig> {
        let binding = self
            .domain
            .action_binding(cmd.root_alias(), cmd.action())?;
        self.domain.model(binding.model_for(cmd.action()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Action;
    use crate::test_support::{quad_builder, sample_domain};

    #[test]
    fn unmapped_model_builds_core_and_flow_only() {
        let builder = quad_builder(sample_domain());
        let quad = builder
            .build(&Command::new("acme", "clinic", "patient", Action::New))
            .expect("build");
        let state = quad.read();
        assert!(state.view().is_none());
        assert_eq!(state.core().model_alias(), "patient");
        assert_eq!(state.flow().model_alias(), "processFlow");
        assert!(quad.runtime().is_running());
    }

    #[test]
    fn mapped_model_builds_view_over_core() {
        let builder = quad_builder(sample_domain());
        let cmd = Command::new("acme", "clinic", "patient", Action::Search);
        let quad = builder.build(&cmd).expect("build");
        let state = quad.read();
        assert_eq!(state.view().map(|v| v.model_alias()), Some("patientSummary"));
        assert_eq!(state.core().model_alias(), "patient");
    }

    #[test]
    fn create_uses_input_model_and_fetch_uses_output_model() {
        let builder = quad_builder(sample_domain());
        let create = builder
            .resolve_exec_config(&Command::new("acme", "clinic", "patient", Action::New))
            .expect("create config");
        assert!(create.view.is_none());

        let fetch = builder
            .resolve_exec_config(&Command::new("acme", "clinic", "visit", Action::Get))
            .expect("fetch config");
        assert_eq!(fetch.view.as_ref().map(|v| v.alias.as_str()), Some("visitView"));
        assert_eq!(fetch.core.alias, "visit");
    }

    #[test]
    fn missing_binding_is_configuration_error() {
        let builder = quad_builder(sample_domain());
        let err = builder
            .build(&Command::new("acme", "clinic", "patient", Action::Delete))
            .expect_err("no delete binding");
        assert!(err.is_configuration());

        let err = builder
            .build(&Command::new("acme", "clinic", "billing", Action::Get))
            .expect_err("unknown root");
        assert!(err.is_configuration());
    }
}
