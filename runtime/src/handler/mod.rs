//! Function handlers run as steps of an executor pipeline.
//!
//! A command selects a handler with the `fn` request parameter, e.g.
//! `fn=_initEntity`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::convert::JsonConverter;
use crate::error::Result;
use crate::state::param::ParamRef;

pub mod init_entity;

pub use init_entity::InitEntityHandler;

/// Request parameter naming the function handler to run.
pub const KEY_FN: &str = "fn";
pub const FN_INIT_ENTITY: &str = "_initEntity";

pub trait FunctionHandler: Send + Sync {
    /// Run against `root` (the entity root param); returns the param produced.
    fn execute(&self, ctx: &ExecutionContext, root: ParamRef) -> Result<ParamRef>;
}

/// Handlers available to the default create executor.
pub fn default_handlers() -> HashMap<String, Arc<dyn FunctionHandler>> {
    let mut handlers: HashMap<String, Arc<dyn FunctionHandler>> = HashMap::new();
    handlers.insert(
        FN_INIT_ENTITY.to_string(),
        Arc::new(InitEntityHandler::new(Arc::new(JsonConverter))),
    );
    handlers
}
