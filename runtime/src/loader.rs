//! Execution context loader: picks an acquisition strategy for a command and
//! carries it out against the executors and the session cache.

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::cache::{SessionCache, SessionKey};
use crate::command::{Action, Behavior, Command};
use crate::context::{CommandMessage, ExecutionContext};
use crate::core::strategy::{Acquisition, decide};
use crate::domain::CachePolicy;
use crate::error::Result;
use crate::executor::{ExecutorRegistry, Input};
use crate::quad_builder::QuadModelBuilder;
use crate::session::SessionProvider;

/// A loaded context and the strategy that produced it.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub context: ExecutionContext,
    pub strategy: Acquisition,
}

pub struct ExecutionContextLoader {
    quad_builder: Arc<QuadModelBuilder>,
    executors: ExecutorRegistry,
    cache: Arc<dyn SessionCache>,
}

impl ExecutionContextLoader {
    pub fn new(
        quad_builder: Arc<QuadModelBuilder>,
        executors: ExecutorRegistry,
        cache: Arc<dyn SessionCache>,
    ) -> Self {
        Self {
            quad_builder,
            executors,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<dyn SessionCache> {
        &self.cache
    }

    /// Load using the session id supplied by a request-scoped provider.
    pub fn load_current(&self, cmd: &Command, sessions: &dyn SessionProvider) -> Result<ExecutionContext> {
        self.load(cmd, &sessions.session_id())
    }

    pub fn load(&self, cmd: &Command, session_id: &str) -> Result<ExecutionContext> {
        self.load_message(CommandMessage::new(cmd.clone()), session_id)
            .map(|loaded| loaded.context)
    }

    /// Load a command with its envelope, reporting the strategy taken.
    #[instrument(skip_all, fields(cmd = %message.command, session = session_id))]
    pub fn load_message(&self, message: CommandMessage, session_id: &str) -> Result<Loaded> {
        let mut ctx = ExecutionContext::new(message);
        let key = SessionKey::new(&ctx, session_id);
        let strategy = decide(ctx.command(), || self.cache.exists(&key));
        debug!(%strategy, context = %ctx.id(), "acquisition strategy");

        match strategy {
            Acquisition::Transient => {
                let quad = self.quad_builder.build(ctx.command())?;
                ctx.set_quad_model(Arc::new(quad));
                Ok(Loaded {
                    context: ctx,
                    strategy,
                })
            }
            Acquisition::FreshCreate => Ok(Loaded {
                context: self.load_entity(ctx, Action::New, session_id)?,
                strategy,
            }),
            Acquisition::CacheHit => {
                let cached = self
                    .cache
                    .get(&key)
                    .and_then(|cached| cached.quad_model().cloned());
                match cached {
                    Some(quad) => {
                        ctx.set_quad_model(quad);
                        Ok(Loaded {
                            context: ctx,
                            strategy,
                        })
                    }
                    // Evicted between the existence check and the read.
                    None => Ok(Loaded {
                        context: self.load_entity(ctx, Action::Get, session_id)?,
                        strategy: Acquisition::Reload,
                    }),
                }
            }
            Acquisition::Reload => Ok(Loaded {
                context: self.load_entity(ctx, Action::Get, session_id)?,
                strategy,
            }),
        }
    }

    /// Remove the cache entry and stop the context's runtime.
    ///
    /// Returns `false` when there was no entry; the runtime is stopped either way.
    #[instrument(skip_all, fields(context = %ctx.id(), session = session_id))]
    pub fn unload(&self, ctx: &ExecutionContext, session_id: &str) -> Result<bool> {
        let removed = self.cache.remove(&SessionKey::new(ctx, session_id)).is_some();
        if !removed {
            debug!("unload: no session entry");
        }
        ctx.require_quad_model()?.stop();
        Ok(removed)
    }

    /// Stop every cached runtime and empty the cache.
    pub fn clear(&self) {
        let dropped = self.cache.clear_all();
        debug!(dropped, "loader cleared");
    }

    fn load_entity(&self, ctx: ExecutionContext, action: Action, session_id: &str) -> Result<ExecutionContext> {
        let executor = self.executors.get(action, Behavior::Execute)?;
        let input = Input {
            uri: ctx.command().absolute_uri(),
            action: ctx.command().action(),
            behavior: Behavior::Execute,
            context: ctx,
        };
        let output = executor.execute(&input)?;
        let ctx = output.context;

        let root = self
            .quad_builder
            .domain()
            .root_domain(ctx.command().root_alias())?;
        if root.cache == CachePolicy::Device {
            trace!(context = %ctx.id(), "device-cached; storing in session");
            self.cache.put(SessionKey::new(&ctx, session_id), ctx.clone())?;
        }
        Ok(ctx)
    }
}
