//! Marker scanning for command path templates.
//!
//! A marker is `<!expr!>`. Markers do not nest; the first `!>` after an
//! opening `<!` closes it.

use std::sync::LazyLock;

use regex::Regex;

pub const MARKER_PREFIX: &str = "<!";
pub const MARKER_SUFFIX: &str = "!>";
/// Session/user context marker, e.g. `<!#self.loginId!>`.
pub const MARKER_SESSION_SELF: &str = "#self";
/// Path of the param the command is evaluated against.
pub const MARKER_COMMAND_PARAM_CURRENT_SELF: &str = "#this";

const JSON_FN_PREFIX: &str = "json(";
const JSON_FN_SUFFIX: &str = ")";

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!(.*?)!>").expect("marker regex"));

/// One marker occurrence in a template, by byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSpan {
    pub start: usize,
    pub end: usize,
    /// Inner expression with delimiters stripped and whitespace trimmed.
    pub expr: String,
}

/// Collect marker spans left to right.
pub fn scan(template: &str) -> Vec<MarkerSpan> {
    MARKER_RE
        .captures_iter(template)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            Some(MarkerSpan {
                start: whole.start(),
                end: whole.end(),
                expr: strip_prefix_suffix(whole.as_str()).to_string(),
            })
        })
        .collect()
}

/// Remove the marker delimiters from `<!expr!>`.
pub fn strip_prefix_suffix(marker: &str) -> &str {
    marker
        .strip_prefix(MARKER_PREFIX)
        .and_then(|rest| rest.strip_suffix(MARKER_SUFFIX))
        .unwrap_or(marker)
        .trim()
}

/// What a marker expression refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind<'a> {
    /// `#self.loginId`: the authenticated user's login id.
    SessionLoginId,
    /// Any other `#self...`: the command's client alias.
    SessionClient,
    /// `#this`: the subject param's own path.
    CurrentParam,
    /// `json(path)`: leaf state at `path`, serialized to JSON.
    Json(&'a str),
    /// Bare `path`: string form of the state at `path`.
    Path(&'a str),
}

pub fn classify(expr: &str) -> MarkerKind<'_> {
    if starts_with_ignore_case(expr, MARKER_SESSION_SELF) {
        if expr.ends_with("loginId") {
            return MarkerKind::SessionLoginId;
        }
        return MarkerKind::SessionClient;
    }
    if starts_with_ignore_case(expr, MARKER_COMMAND_PARAM_CURRENT_SELF) {
        return MarkerKind::CurrentParam;
    }
    if let Some(inner) = expr
        .strip_prefix(JSON_FN_PREFIX)
        .and_then(|rest| rest.strip_suffix(JSON_FN_SUFFIX))
    {
        return MarkerKind::Json(inner.trim());
    }
    MarkerKind::Path(expr)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Rebuild `template` with each span replaced by the matching value.
///
/// Literal text between spans is copied unchanged. `values` must be in span
/// order and of the same length.
pub fn substitute(template: &str, spans: &[MarkerSpan], values: &[String]) -> String {
    debug_assert_eq!(spans.len(), values.len());
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for (span, value) in spans.iter().zip(values) {
        out.push_str(&template[cursor..span.start]);
        out.push_str(value);
        cursor = span.end;
    }
    out.push_str(&template[cursor..]);
    out
}
