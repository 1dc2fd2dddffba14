//! Commands: immutable requests addressing a domain entity and an action.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Action requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new entity instance.
    #[serde(alias = "create")]
    New,
    /// Read/fetch an existing entity instance.
    #[serde(alias = "fetch", alias = "read")]
    Get,
    Search,
    /// Configuration lookup; never touches persisted state.
    #[serde(alias = "configure")]
    Config,
    Update,
    Replace,
    Delete,
    Process,
    Nav,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::New,
        Action::Get,
        Action::Search,
        Action::Config,
        Action::Update,
        Action::Replace,
        Action::Delete,
        Action::Process,
        Action::Nav,
    ];

    /// Path segment form, e.g. `_new`.
    pub fn code(self) -> &'static str {
        match self {
            Action::New => "_new",
            Action::Get => "_get",
            Action::Search => "_search",
            Action::Config => "_config",
            Action::Update => "_update",
            Action::Replace => "_replace",
            Action::Delete => "_delete",
            Action::Process => "_process",
            Action::Nav => "_nav",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('_').to_ascii_lowercase();
        let action = match name.as_str() {
            "new" | "create" => Action::New,
            "get" | "fetch" | "read" => Action::Get,
            "search" => Action::Search,
            "config" | "configure" => Action::Config,
            "update" => Action::Update,
            "replace" => Action::Replace,
            "delete" => Action::Delete,
            "process" => Action::Process,
            "nav" => Action::Nav,
            _ => return Err(format!("unknown action '{s}'")),
        };
        Ok(action)
    }
}

/// How an action is carried out. Executors are keyed by `(Action, Behavior)`;
/// the loader only dispatches `Execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    #[default]
    Execute,
}

impl Behavior {
    pub fn code(self) -> &'static str {
        match self {
            Behavior::Execute => "$execute",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Immutable request addressing a root domain entity and an action.
///
/// Produced by the transport layer; every component reads it without mutation.
/// Derived copies (e.g. after an entity id is assigned) are made with the
/// `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    client_alias: String,
    app_alias: String,
    root_alias: String,
    ref_id: Option<String>,
    path: Vec<String>,
    action: Action,
    behavior: Behavior,
    params: BTreeMap<String, Vec<String>>,
}

impl Command {
    pub fn new(
        client_alias: impl Into<String>,
        app_alias: impl Into<String>,
        root_alias: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            client_alias: client_alias.into(),
            app_alias: app_alias.into(),
            root_alias: root_alias.into(),
            ref_id: None,
            path: Vec::new(),
            action,
            behavior: Behavior::Execute,
            params: BTreeMap::new(),
        }
    }

    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    /// Append sub-path segments below the root domain (`/` separated).
    pub fn with_path(mut self, path: &str) -> Self {
        self.path.extend(
            path.split('/')
                .filter(|seg| !seg.is_empty())
                .map(str::to_string),
        );
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn client_alias(&self) -> &str {
        &self.client_alias
    }

    pub fn app_alias(&self) -> &str {
        &self.app_alias
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn ref_id(&self) -> Option<&str> {
        self.ref_id.as_deref()
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    /// True when the command addresses the root domain with no sub-path.
    pub fn is_root_domain_only(&self) -> bool {
        self.path.is_empty()
    }

    pub fn first_parameter_value(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.params
    }

    /// `/{client}/{app}/p/{root}[:{refId}]`
    pub fn root_domain_uri(&self) -> String {
        let mut uri = format!(
            "/{}/{}/p/{}",
            self.client_alias, self.app_alias, self.root_alias
        );
        if let Some(ref_id) = &self.ref_id {
            uri.push(':');
            uri.push_str(ref_id);
        }
        uri
    }

    /// Root domain URI plus sub-path, action and behavior.
    pub fn absolute_uri(&self) -> String {
        let mut uri = self.root_domain_uri();
        for seg in &self.path {
            uri.push('/');
            uri.push_str(seg);
        }
        uri.push('/');
        uri.push_str(self.action.code());
        uri.push_str("?b=");
        uri.push_str(self.behavior.code());
        uri
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.absolute_uri())
    }
}
