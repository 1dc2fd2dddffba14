//! Resolves `<!...!>` markers in command path templates against live state.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::context::ExecutionContext;
use crate::convert::Converter;
use crate::core::path_expr::{self, MarkerKind};
use crate::error::{Result, RuntimeError};
use crate::state::param::ParamRef;
use crate::state::quad::ExecutionState;

pub struct CommandPathVariableResolver {
    converter: Arc<dyn Converter>,
}

impl CommandPathVariableResolver {
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self { converter }
    }

    /// Substitute every marker in `template`, left to right.
    ///
    /// `subject` is the param the command is evaluated against; path markers
    /// are looked up in its tree. Templates without markers come back as-is.
    pub fn resolve(&self, ctx: &ExecutionContext, subject: ParamRef, template: &str) -> Result<String> {
        let spans = path_expr::scan(template);
        if spans.is_empty() {
            return Ok(template.to_string());
        }

        let quad = ctx.require_quad_model()?;
        let state = quad.read();
        let values = spans
            .iter()
            .map(|span| self.map(ctx, &state, subject, &span.expr))
            .collect::<Result<Vec<_>>>()?;
        let out = path_expr::substitute(template, &spans, &values);
        trace!(template, resolved = %out, markers = spans.len(), "path resolved");
        Ok(out)
    }

    fn map(
        &self,
        ctx: &ExecutionContext,
        state: &ExecutionState,
        subject: ParamRef,
        expr: &str,
    ) -> Result<String> {
        match path_expr::classify(expr) {
            MarkerKind::SessionLoginId => ctx
                .message()
                .user
                .as_ref()
                .map(|user| user.login_id.clone())
                .ok_or_else(|| {
                    RuntimeError::Lookup(format!("no logged-in user for {}", ctx.command()))
                }),
            MarkerKind::SessionClient => Ok(ctx.command().client_alias().to_string()),
            MarkerKind::CurrentParam => Ok(state.param(subject)?.path().to_string()),
            MarkerKind::Json(path) => {
                let found = find_in_subject_tree(state, subject, path)?;
                self.converter.to_json(&state.leaf_state(found)?)
            }
            MarkerKind::Path(path) => {
                let found = find_in_subject_tree(state, subject, path)?;
                Ok(string_form(&state.leaf_state(found)?))
            }
        }
    }
}

fn find_in_subject_tree(state: &ExecutionState, subject: ParamRef, path: &str) -> Result<ParamRef> {
    state.find(subject.tree, path).ok_or_else(|| {
        RuntimeError::Configuration(format!(
            "path marker references missing param '{}' in {:?} tree",
            path, subject.tree
        ))
    })
}

/// Strings unquoted, everything else as JSON text (`null` for unset).
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
