//! Error taxonomy for command evaluation.
//!
//! Every variant is fatal to the command being evaluated. Nothing in this crate
//! retries or suppresses these errors; they surface to the caller of the
//! component method that detected them.

use thiserror::Error;

/// Errors raised while acquiring or building execution state.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Bad command wiring: missing/blank argument, missing binding or model,
    /// unresolved mapping target, or a referenced param path that does not exist.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// More than one match where exactly one was expected.
    #[error("ambiguous state: {0}")]
    AmbiguousState(String),
    /// A required param, label, cache entry or persisted entity is absent.
    #[error("not found: {0}")]
    Lookup(String),
    #[error("cannot convert to {type_name}: {reason}")]
    Conversion { type_name: String, reason: String },
    #[error("validation failed at {path}: {reason}")]
    Validation { path: String, reason: String },
    /// Raised by `put` when the cache runs with the reject policy.
    #[error("session cache already holds {0}")]
    CacheConflict(String),
    #[error("no command executor registered for {0}")]
    Executor(String),
}

impl RuntimeError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, RuntimeError::Configuration(_))
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, RuntimeError::Lookup(_))
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
