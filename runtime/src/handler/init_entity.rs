//! Assigns converted initial state to one param of a newly created entity.

use std::sync::Arc;

use tracing::debug;

use crate::context::ExecutionContext;
use crate::convert::Converter;
use crate::error::{Result, RuntimeError};
use crate::handler::FunctionHandler;
use crate::state::param::ParamRef;

/// Path of the param to initialize, relative to the entity root.
pub const KEY_TARGET_PATH: &str = "target";
/// JSON payload to convert into the target's declared type.
pub const KEY_JSON: &str = "json";

pub struct InitEntityHandler {
    converter: Arc<dyn Converter>,
}

impl InitEntityHandler {
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self { converter }
    }
}

impl FunctionHandler for InitEntityHandler {
    fn execute(&self, ctx: &ExecutionContext, root: ParamRef) -> Result<ParamRef> {
        let cmd = ctx.command();
        let target_path = cmd.first_parameter_value(KEY_TARGET_PATH).ok_or_else(|| {
            RuntimeError::Configuration(format!(
                "'{KEY_TARGET_PATH}' must be configured but found none for cmd: {cmd}"
            ))
        })?;

        let quad = ctx.require_quad_model()?;
        let mut state = quad.write();
        let target = state.find(root.tree, target_path).ok_or_else(|| {
            RuntimeError::Configuration(format!(
                "no param for configured target path: {target_path} for cmd: {cmd}"
            ))
        })?;
        let state_type = state.param(target)?.config().state_type.clone();

        let json = cmd
            .first_parameter_value(KEY_JSON)
            .map(str::trim)
            .filter(|json| !json.is_empty())
            .ok_or_else(|| {
                RuntimeError::Configuration(format!(
                    "'{KEY_JSON}' must be configured but found none for cmd: {cmd}"
                ))
            })?;

        let converted = self.converter.from_json(&state_type, json)?;
        state.set_state(target, converted)?;
        debug!(target = target_path, type_name = %state_type.name, "initial state assigned");
        Ok(root)
    }
}
