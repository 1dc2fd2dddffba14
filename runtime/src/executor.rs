//! Command executors invoked by the loader's create and fetch pipelines.
//!
//! The [`CommandExecutor`] trait decouples the loader from how state is
//! produced. Executors are registered per `(Action, Behavior)`; tests swap in
//! counting or scripted executors without touching the loader.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::command::{Action, Behavior};
use crate::context::ExecutionContext;
use crate::error::{Result, RuntimeError};
use crate::handler::{FunctionHandler, KEY_FN};
use crate::quad_builder::QuadModelBuilder;
use crate::state::param::{ParamRef, TreeKind};

/// Request envelope handed to an executor.
#[derive(Debug, Clone)]
pub struct Input {
    pub uri: String,
    pub context: ExecutionContext,
    pub action: Action,
    pub behavior: Behavior,
}

impl Input {
    pub fn execute(context: ExecutionContext) -> Self {
        Self {
            uri: context.command().absolute_uri(),
            action: context.command().action(),
            behavior: Behavior::Execute,
            context,
        }
    }
}

/// Executor result: the possibly-updated context and the param it produced.
#[derive(Debug, Clone)]
pub struct Output {
    pub context: ExecutionContext,
    pub result: ParamRef,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(&self, input: &Input) -> Result<Output>;
}

/// Executors keyed by action and behavior.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<(Action, Behavior), Arc<dyn CommandExecutor>>,
}

impl ExecutorRegistry {
    /// Registry with the default create and fetch executors.
    pub fn with_defaults(
        builder: Arc<QuadModelBuilder>,
        handlers: HashMap<String, Arc<dyn FunctionHandler>>,
    ) -> Self {
        let mut registry = Self::default();
        registry.register(
            Action::New,
            Behavior::Execute,
            Arc::new(DefaultNewExecutor::new(Arc::clone(&builder), handlers)),
        );
        registry.register(
            Action::Get,
            Behavior::Execute,
            Arc::new(DefaultGetExecutor::new(builder)),
        );
        registry
    }

    pub fn register(&mut self, action: Action, behavior: Behavior, executor: Arc<dyn CommandExecutor>) {
        self.executors.insert((action, behavior), executor);
    }

    pub fn get(&self, action: Action, behavior: Behavior) -> Result<Arc<dyn CommandExecutor>> {
        self.executors
            .get(&(action, behavior))
            .cloned()
            .ok_or_else(|| RuntimeError::Executor(format!("{}{}", action, behavior)))
    }
}

/// Create pipeline: allocate an id, build fresh state, run the requested
/// function handler, then validate and persist core state.
pub struct DefaultNewExecutor {
    builder: Arc<QuadModelBuilder>,
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl DefaultNewExecutor {
    pub fn new(
        builder: Arc<QuadModelBuilder>,
        handlers: HashMap<String, Arc<dyn FunctionHandler>>,
    ) -> Self {
        Self { builder, handlers }
    }
}

impl CommandExecutor for DefaultNewExecutor {
    #[instrument(skip_all, fields(uri = %input.uri))]
    fn execute(&self, input: &Input) -> Result<Output> {
        let gateway = Arc::clone(&self.builder.support().gateway);
        let mut cmd = input.context.command().clone();
        let ref_id = match cmd.ref_id() {
            Some(id) => id.to_string(),
            None => gateway.next_id(cmd.root_alias())?,
        };
        cmd = cmd.with_ref_id(ref_id.clone());

        let quad = Arc::new(self.builder.build(&cmd)?);
        let mut ctx = input.context.clone().with_command(cmd.clone());
        ctx.set_quad_model(Arc::clone(&quad));

        let root = ParamRef::root(quad.read().entity_tree());
        let result = match cmd.first_parameter_value(KEY_FN) {
            Some(name) => {
                let handler = self.handlers.get(name).ok_or_else(|| {
                    RuntimeError::Configuration(format!(
                        "no function handler '{}' for cmd: {}",
                        name, cmd
                    ))
                })?;
                debug!(function = name, "running function handler");
                handler.execute(&ctx, root)?
            }
            None => root,
        };

        let core_state = {
            let state = quad.read();
            self.builder
                .support()
                .validate_tree(&state, TreeKind::Core)?;
            state.leaf_state(ParamRef::root(TreeKind::Core))?
        };
        gateway.save(cmd.root_alias(), &ref_id, &core_state)?;
        info!(context = %ctx.id(), "entity created");
        Ok(Output {
            context: ctx,
            result,
        })
    }
}

/// Fetch pipeline: build state seeded from persistence.
pub struct DefaultGetExecutor {
    builder: Arc<QuadModelBuilder>,
}

impl DefaultGetExecutor {
    pub fn new(builder: Arc<QuadModelBuilder>) -> Self {
        Self { builder }
    }
}

impl CommandExecutor for DefaultGetExecutor {
    #[instrument(skip_all, fields(uri = %input.uri))]
    fn execute(&self, input: &Input) -> Result<Output> {
        let quad = Arc::new(self.builder.build(input.context.command())?);
        let result = ParamRef::root(quad.read().entity_tree());
        let mut ctx = input.context.clone();
        ctx.set_quad_model(quad);
        debug!(context = %ctx.id(), "entity loaded");
        Ok(Output {
            context: ctx,
            result,
        })
    }
}

/// Locate a produced param among `outputs` by path suffix.
///
/// With no suffix exactly one output is expected. With a suffix the first
/// output whose param path ends with it wins.
pub fn find_output_param(outputs: &[Output], path_suffix: Option<&str>) -> Result<ParamRef> {
    let Some(suffix) = path_suffix else {
        return match outputs {
            [single] => Ok(single.result),
            [] => Err(RuntimeError::Lookup("no outputs".to_string())),
            _ => Err(RuntimeError::AmbiguousState(format!(
                "expected one output, found {}",
                outputs.len()
            ))),
        };
    };
    for output in outputs {
        let Some(quad) = output.context.quad_model() else {
            continue;
        };
        let state = quad.read();
        if let Ok(param) = state.param(output.result) {
            if param.path().ends_with(suffix) {
                return Ok(output.result);
            }
        }
    }
    Err(RuntimeError::Lookup(format!(
        "no output param with path ending '{suffix}'"
    )))
}
