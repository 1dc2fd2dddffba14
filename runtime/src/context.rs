//! Execution context: ties a command to its materialized state.

use std::sync::Arc;

use crate::command::Command;
use crate::error::{Result, RuntimeError};
use crate::session::ClientUser;
use crate::state::quad::QuadModel;

/// A command plus envelope metadata attached by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub command: Command,
    /// Authenticated user, when the transport established one.
    pub user: Option<ClientUser>,
}

impl CommandMessage {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            user: None,
        }
    }

    pub fn with_user(mut self, user: ClientUser) -> Self {
        self.user = Some(user);
        self
    }
}

/// Per-command correlation of a command and its QuadModel.
///
/// Clones share the QuadModel.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    id: String,
    message: CommandMessage,
    quad_model: Option<Arc<QuadModel>>,
}

impl ExecutionContext {
    pub fn new(message: CommandMessage) -> Self {
        Self {
            id: message.command.root_domain_uri(),
            message,
            quad_model: None,
        }
    }

    pub fn from_command(command: Command) -> Self {
        Self::new(CommandMessage::new(command))
    }

    /// Stable id: the root domain URI of the command.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message(&self) -> &CommandMessage {
        &self.message
    }

    pub fn command(&self) -> &Command {
        &self.message.command
    }

    pub fn quad_model(&self) -> Option<&Arc<QuadModel>> {
        self.quad_model.as_ref()
    }

    /// QuadModel, or a lookup error if the context was never built.
    pub fn require_quad_model(&self) -> Result<&Arc<QuadModel>> {
        self.quad_model
            .as_ref()
            .ok_or_else(|| RuntimeError::Lookup(format!("no quad model for {}", self.id)))
    }

    pub fn set_quad_model(&mut self, quad_model: Arc<QuadModel>) {
        self.quad_model = Some(quad_model);
    }

    /// Same message with `command` swapped in; the id follows the new command.
    pub fn with_command(mut self, command: Command) -> Self {
        self.id = command.root_domain_uri();
        self.message.command = command;
        self
    }
}
