//! Session identity supplied by the request-handling layer.

use serde::{Deserialize, Serialize};

/// Authenticated user attached to a command message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUser {
    pub login_id: String,
}

impl ClientUser {
    pub fn new(login_id: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
        }
    }
}

/// Request-scoped source of the current session id.
pub trait SessionProvider {
    fn session_id(&self) -> String;
}

/// Provider that always returns the same session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSessionProvider(pub String);

impl SessionProvider for FixedSessionProvider {
    fn session_id(&self) -> String {
        self.0.clone()
    }
}
