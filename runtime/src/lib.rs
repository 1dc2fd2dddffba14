//! Command-driven execution state runtime.
//!
//! A [`command::Command`] addresses a root domain entity and an action. The
//! [`loader::ExecutionContextLoader`] decides how to obtain the entity's
//! [`state::quad::QuadModel`] (transient shell, fresh create, session cache
//! hit, or reload) and caches device-scoped contexts per session.
//!
//! - **[`core`]**: Pure logic (acquisition decision, path marker scanning).
//!   No I/O, no shared state.
//! - **[`state`]**: Param trees, the QuadModel and its builder.
//! - **[`io`]**: TOML-backed runtime and domain configuration.
//!
//! Executors ([`executor`]), function handlers ([`handler`]) and the path
//! resolver ([`resolver`]) run on top of a loaded context.

pub mod cache;
pub mod command;
pub mod context;
pub mod convert;
pub mod core;
pub mod domain;
pub mod error;
pub mod executor;
pub mod exit_codes;
pub mod handler;
pub mod io;
pub mod loader;
pub mod logging;
pub mod quad_builder;
pub mod resolver;
pub mod session;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
