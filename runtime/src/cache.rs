//! Session-scoped cache of live execution contexts.
//!
//! All mutation (`put`, `remove`, `clear_all`) is serialized under one write
//! lock. `exists` and `get` take the read lock and may be stale by the time the
//! caller acts on them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::context::ExecutionContext;
use crate::error::{Result, RuntimeError};

/// Composite cache key; distinct session ids always yield distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub context_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(ctx: &ExecutionContext, session_id: &str) -> Self {
        Self {
            context_id: ctx.id().to_string(),
            session_id: session_id.to_string(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_sessionId{{{}}}", self.context_id, self.session_id)
    }
}

/// What `put` does when the key already holds a different live context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Stop the displaced context's runtime, then replace it.
    #[default]
    Replace,
    /// Keep the existing entry and fail the put.
    Reject,
}

/// Store of live contexts keyed by `(context id, session id)`.
pub trait SessionCache: Send + Sync {
    fn exists(&self, key: &SessionKey) -> bool;

    fn get(&self, key: &SessionKey) -> Option<ExecutionContext>;

    fn put(&self, key: SessionKey, ctx: ExecutionContext) -> Result<()>;

    /// Remove the entry. Returns `None` if it was absent.
    fn remove(&self, key: &SessionKey) -> Option<ExecutionContext>;

    /// Stop every cached runtime and drop all entries. Returns how many were dropped.
    fn clear_all(&self) -> usize;
}

#[derive(Debug)]
pub struct InMemorySessionCache {
    entries: RwLock<HashMap<SessionKey, ExecutionContext>>,
    conflict: ConflictPolicy,
}

impl InMemorySessionCache {
    pub fn new(initial_capacity: usize, conflict: ConflictPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(initial_capacity)),
            conflict,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySessionCache {
    fn default() -> Self {
        Self::new(100, ConflictPolicy::default())
    }
}

impl SessionCache for InMemorySessionCache {
    fn exists(&self, key: &SessionKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn get(&self, key: &SessionKey) -> Option<ExecutionContext> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: SessionKey, ctx: ExecutionContext) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key) {
            if !same_quad_model(existing, &ctx) {
                match self.conflict {
                    ConflictPolicy::Reject => {
                        return Err(RuntimeError::CacheConflict(key.to_string()));
                    }
                    ConflictPolicy::Replace => {
                        warn!(key = %key, "replacing live context; stopping displaced runtime");
                        if let Some(quad) = existing.quad_model() {
                            quad.stop();
                        }
                    }
                }
            }
        }
        trace!(key = %key, size = entries.len(), "session put");
        entries.insert(key, ctx);
        Ok(())
    }

    fn remove(&self, key: &SessionKey) -> Option<ExecutionContext> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        trace!(key = %key, found = removed.is_some(), "session remove");
        removed
    }

    fn clear_all(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for ctx in entries.values() {
            if let Some(quad) = ctx.quad_model() {
                quad.stop();
            }
        }
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "session cache cleared");
        dropped
    }
}

fn same_quad_model(a: &ExecutionContext, b: &ExecutionContext) -> bool {
    match (a.quad_model(), b.quad_model()) {
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        (None, None) => true,
        _ => false,
    }
}
