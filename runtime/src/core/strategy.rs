//! State-acquisition decision for a command.

use std::fmt;

use crate::command::{Action, Command};

/// How the loader obtains execution state for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Bare QuadModel shell: no persistence round-trip, no caching.
    Transient,
    /// Run the create pipeline; never reuses cached state.
    FreshCreate,
    /// Adopt the live context already cached for this session.
    CacheHit,
    /// Run the fetch pipeline.
    Reload,
}

impl fmt::Display for Acquisition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Acquisition::Transient => "transient",
            Acquisition::FreshCreate => "fresh-create",
            Acquisition::CacheHit => "cache-hit",
            Acquisition::Reload => "reload",
        };
        f.write_str(name)
    }
}

/// Search and config are read-only/ephemeral.
pub fn is_transient(cmd: &Command) -> bool {
    matches!(cmd.action(), Action::Search | Action::Config)
}

/// Decide once, in fixed priority order: transient, fresh-create, cache-hit, reload.
///
/// `cached` is only consulted when the first two rules do not apply.
pub fn decide(cmd: &Command, cached: impl FnOnce() -> bool) -> Acquisition {
    if is_transient(cmd) {
        return Acquisition::Transient;
    }
    if cmd.is_root_domain_only() && cmd.action() == Action::New {
        return Acquisition::FreshCreate;
    }
    if cached() {
        return Acquisition::CacheHit;
    }
    Acquisition::Reload
}
