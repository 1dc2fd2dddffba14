//! Test-only fixtures: a sample clinic domain and pre-wired builders.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{InMemorySessionCache, SessionCache};
use crate::command::{Action, Behavior, Command};
use crate::context::ExecutionContext;
use crate::domain::{FLOW_MODEL_ALIAS, ModelDef, ParamConfig, StateKind, StateType};
use crate::error::Result;
use crate::executor::{CommandExecutor, ExecutorRegistry, Input, Output};
use crate::handler::default_handlers;
use crate::io::domain_config::DomainConfig;
use crate::loader::ExecutionContextLoader;
use crate::quad_builder::QuadModelBuilder;
use crate::state::builder::{DefaultStateBuilder, StateBuilderSupport};
use crate::state::gateway::{InMemoryParamStateGateway, SchemaValidator};
use crate::state::param::{ParamTree, TreeKind};
use crate::state::quad::{ExecutionState, QuadModel};

/// Two root domains: `patient` (device-cached, mapped search view) and
/// `visit` (uncached, mapped fetch view).
pub const SAMPLE_DOMAIN: &str = r#"
[[domain]]
alias = "patient"
cache = "device"

[[domain.binding]]
action = "new"
input = "patient"

[[domain.binding]]
action = "get"
input = "patient"

[[domain.binding]]
action = "config"
input = "patient"

[[domain.binding]]
action = "search"
input = "patient"
output = "patientSummary"

[[domain]]
alias = "visit"
cache = "none"

[[domain.binding]]
action = "new"
input = "visit"

[[domain.binding]]
action = "get"
input = "visit"
output = "visitView"

[[model]]
alias = "patient"
type = "Patient"

[[model.param]]
name = "name"
kind = "string"

[[model.param.label]]
locale = "en-US"
text = "Name"

[[model.param]]
name = "status"
kind = "string"
default = "active"

[[model.param]]
name = "age"
kind = "integer"
schema = { type = "integer", minimum = 0 }

[[model.param]]
name = "address"
type = "Address"

[[model.param.param]]
name = "city"
kind = "string"

[[model.param.param]]
name = "zip"
kind = "string"

[[model.param]]
name = "tags"
kind = "array"

[[model]]
alias = "patientSummary"
maps_to = "patient"

[[model.param]]
name = "displayName"
kind = "string"
maps_to = "/name"

[[model.param]]
name = "city"
kind = "string"
maps_to = "/address/city"

[[model.param]]
name = "flagged"
kind = "boolean"

[[model]]
alias = "visit"
type = "Visit"

[[model.param]]
name = "reason"
kind = "string"

[[model.param]]
name = "patientId"
kind = "string"

[[model]]
alias = "visitView"
maps_to = "visit"

[[model.param]]
name = "why"
kind = "string"
maps_to = "/reason"

[[model]]
alias = "processFlow"

[[model.param]]
name = "currentPage"
kind = "string"
default = "home"

[[model.param]]
name = "step"
kind = "integer"
default = 0
"#;

/// Parsed [`SAMPLE_DOMAIN`].
pub fn sample_domain() -> Arc<DomainConfig> {
    match DomainConfig::parse(SAMPLE_DOMAIN) {
        Ok(config) => Arc::new(config),
        Err(err) => panic!("sample domain must parse: {err:#}"),
    }
}

/// Builder over `domain` with schema validation and a fresh in-memory gateway.
pub fn quad_builder(domain: Arc<DomainConfig>) -> QuadModelBuilder {
    quad_builder_with(domain, Arc::new(InMemoryParamStateGateway::new()))
}

pub fn quad_builder_with(
    domain: Arc<DomainConfig>,
    gateway: Arc<InMemoryParamStateGateway>,
) -> QuadModelBuilder {
    QuadModelBuilder::new(
        domain,
        Arc::new(DefaultStateBuilder),
        StateBuilderSupport {
            validator: Arc::new(SchemaValidator),
            gateway,
        },
    )
}

/// Context for `cmd` with a minimal one-param quad; no domain lookup involved.
pub fn quad_context(cmd: Command) -> ExecutionContext {
    let core = ModelDef::new(
        cmd.root_alias(),
        vec![ParamConfig::leaf("name", StateType::of(StateKind::String))],
    );
    let flow = ModelDef::new(FLOW_MODEL_ALIAS, Vec::new());
    let state = ExecutionState::new(
        ParamTree::build(TreeKind::Core, &core),
        None,
        ParamTree::build(TreeKind::Flow, &flow),
    );
    let quad = QuadModel::new(cmd.root_alias(), state);
    let mut ctx = ExecutionContext::from_command(cmd);
    ctx.set_quad_model(Arc::new(quad));
    ctx
}

/// Executor wrapper counting invocations.
pub struct CountingExecutor {
    inner: Arc<dyn CommandExecutor>,
    calls: AtomicUsize,
}

impl CountingExecutor {
    pub fn new(inner: Arc<dyn CommandExecutor>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CommandExecutor for CountingExecutor {
    fn execute(&self, input: &Input) -> Result<Output> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(input)
    }
}

/// Loader over the sample domain with its collaborators exposed for assertions.
pub struct LoaderHarness {
    pub loader: ExecutionContextLoader,
    pub cache: Arc<InMemorySessionCache>,
    pub gateway: Arc<InMemoryParamStateGateway>,
    pub creates: Arc<CountingExecutor>,
    pub fetches: Arc<CountingExecutor>,
}

pub fn loader_harness() -> LoaderHarness {
    loader_harness_with(InMemorySessionCache::default())
}

pub fn loader_harness_with(cache: InMemorySessionCache) -> LoaderHarness {
    let gateway = Arc::new(InMemoryParamStateGateway::new());
    let builder = Arc::new(quad_builder_with(sample_domain(), Arc::clone(&gateway)));
    let defaults = ExecutorRegistry::with_defaults(Arc::clone(&builder), default_handlers());

    let mut executors = ExecutorRegistry::default();
    let mut counting = |action: Action| -> Arc<CountingExecutor> {
        let inner = match defaults.get(action, Behavior::Execute) {
            Ok(inner) => inner,
            Err(err) => panic!("default executor missing: {err}"),
        };
        let wrapped = Arc::new(CountingExecutor::new(inner));
        executors.register(
            action,
            Behavior::Execute,
            Arc::clone(&wrapped) as Arc<dyn CommandExecutor>,
        );
        wrapped
    };
    let creates = counting(Action::New);
    let fetches = counting(Action::Get);

    let cache = Arc::new(cache);
    let loader = ExecutionContextLoader::new(
        builder,
        executors,
        Arc::clone(&cache) as Arc<dyn SessionCache>,
    );
    LoaderHarness {
        loader,
        cache,
        gateway,
        creates,
        fetches,
    }
}
