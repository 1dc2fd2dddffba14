//! Loader lifecycle tests over the sample clinic domain.
//!
//! `patient` is device-cached and `visit` is not; counting executors record
//! how often the create and fetch pipelines actually ran.

use std::sync::Arc;

use quad_runtime::cache::{ConflictPolicy, InMemorySessionCache, SessionCache, SessionKey};
use quad_runtime::command::{Action, Command};
use quad_runtime::context::{CommandMessage, ExecutionContext};
use quad_runtime::core::strategy::Acquisition;
use quad_runtime::error::RuntimeError;
use quad_runtime::loader::Loaded;
use quad_runtime::session::FixedSessionProvider;
use quad_runtime::state::gateway::ParamStateGateway;
use quad_runtime::state::param::{ParamRef, TreeKind};
use quad_runtime::test_support::{LoaderHarness, loader_harness, loader_harness_with};
use serde_json::json;

fn cmd(root: &str, action: Action) -> Command {
    Command::new("acme", "clinic", root, action)
}

fn load(harness: &LoaderHarness, cmd: Command, session: &str) -> Loaded {
    harness
        .loader
        .load_message(CommandMessage::new(cmd), session)
        .expect("load")
}

fn create_patient(harness: &LoaderHarness, session: &str) -> ExecutionContext {
    let loaded = load(harness, cmd("patient", Action::New), session);
    assert_eq!(loaded.strategy, Acquisition::FreshCreate);
    loaded.context
}

/// Verifies create assigns an id, persists core state and caches a device entity.
#[test]
fn create_assigns_id_persists_and_caches_device_entity() {
    let harness = loader_harness();
    let ctx = create_patient(&harness, "s1");

    assert_eq!(ctx.id(), "/acme/clinic/p/patient:1");
    assert_eq!(ctx.command().ref_id(), Some("1"));
    assert_eq!(harness.creates.calls(), 1);
    assert!(harness.cache.exists(&SessionKey::new(&ctx, "s1")));

    let persisted = harness
        .gateway
        .load("patient", "1")
        .expect("load")
        .expect("persisted");
    assert_eq!(persisted["status"], json!("active"));
}

/// Verifies a second load in the same session reuses the live QuadModel.
#[test]
fn cache_hit_returns_same_quad_without_fetch() {
    let harness = loader_harness();
    let created = create_patient(&harness, "s1");

    let first = load(&harness, cmd("patient", Action::Get).with_ref_id("1"), "s1");
    let second = load(&harness, cmd("patient", Action::Get).with_ref_id("1"), "s1");

    assert_eq!(first.strategy, Acquisition::CacheHit);
    assert_eq!(second.strategy, Acquisition::CacheHit);
    let created_quad = created.quad_model().expect("quad");
    assert!(Arc::ptr_eq(first.context.quad_model().expect("quad"), created_quad));
    assert!(Arc::ptr_eq(second.context.quad_model().expect("quad"), created_quad));
    assert_eq!(harness.fetches.calls(), 0);
}

/// Verifies a cache hit carries the new command, not the cached one.
#[test]
fn cache_hit_keeps_requesting_command() {
    let harness = loader_harness();
    create_patient(&harness, "s1");

    let cmd = cmd("patient", Action::Get)
        .with_ref_id("1")
        .with_param("view", "compact");
    let loaded = load(&harness, cmd.clone(), "s1");
    assert_eq!(loaded.strategy, Acquisition::CacheHit);
    assert_eq!(loaded.context.command(), &cmd);
}

/// Verifies the same entity in another session is loaded independently.
#[test]
fn sessions_are_isolated() {
    let harness = loader_harness();
    let created = create_patient(&harness, "s1");

    let other = load(&harness, cmd("patient", Action::Get).with_ref_id("1"), "s2");
    assert_eq!(other.strategy, Acquisition::Reload);
    assert_eq!(harness.fetches.calls(), 1);
    let other_quad = other.context.quad_model().expect("quad");
    assert!(!Arc::ptr_eq(other_quad, created.quad_model().expect("quad")));

    let core = ParamRef::root(TreeKind::Core);
    let created_state = created
        .quad_model()
        .expect("quad")
        .read()
        .leaf_state(core)
        .expect("state");
    assert_eq!(other_quad.read().leaf_state(core).expect("state"), created_state);

    // Each session now holds its own entry.
    assert_eq!(harness.cache.len(), 2);
}

/// Verifies an uncached domain is fetched on every load and never stored.
#[test]
fn uncached_domain_is_never_stored() {
    let harness = loader_harness();
    let created = load(&harness, cmd("visit", Action::New), "s1");
    assert_eq!(created.strategy, Acquisition::FreshCreate);
    assert_eq!(created.context.id(), "/acme/clinic/p/visit:1");
    assert!(harness.cache.is_empty());

    for _ in 0..2 {
        let fetched = load(&harness, cmd("visit", Action::Get).with_ref_id("1"), "s1");
        assert_eq!(fetched.strategy, Acquisition::Reload);
        let state = fetched.context.quad_model().expect("quad").read();
        assert_eq!(state.view().map(|v| v.model_alias()), Some("visitView"));
    }
    assert_eq!(harness.fetches.calls(), 2);
    assert!(harness.cache.is_empty());
}

/// Verifies search builds a transient view shell without executors or caching.
#[test]
fn search_is_transient() {
    let harness = loader_harness();
    let loaded = load(&harness, cmd("patient", Action::Search), "s1");

    assert_eq!(loaded.strategy, Acquisition::Transient);
    let state = loaded.context.quad_model().expect("quad").read();
    assert_eq!(state.view().map(|v| v.model_alias()), Some("patientSummary"));
    assert_eq!(harness.creates.calls(), 0);
    assert_eq!(harness.fetches.calls(), 0);
    assert!(harness.cache.is_empty());
}

/// Verifies unload stops the runtime and the next load reloads.
#[test]
fn unload_then_load_reloads() {
    let harness = loader_harness();
    let created = create_patient(&harness, "s1");

    assert!(harness.loader.unload(&created, "s1").expect("unload"));
    assert!(!created.quad_model().expect("quad").runtime().is_running());
    assert!(!harness.cache.exists(&SessionKey::new(&created, "s1")));

    let reloaded = load(&harness, cmd("patient", Action::Get).with_ref_id("1"), "s1");
    assert_eq!(reloaded.strategy, Acquisition::Reload);
    let quad = reloaded.context.quad_model().expect("quad");
    assert!(quad.runtime().is_running());
    assert!(!Arc::ptr_eq(quad, created.quad_model().expect("quad")));
}

/// Verifies unload of an uncached context reports no entry but still stops it.
#[test]
fn unload_without_entry_returns_false() {
    let harness = loader_harness();
    let visit = load(&harness, cmd("visit", Action::New), "s1").context;

    assert!(!harness.loader.unload(&visit, "s1").expect("unload"));
    assert!(!visit.quad_model().expect("quad").runtime().is_running());
}

/// Verifies clear stops every cached runtime across sessions.
#[test]
fn clear_stops_all_cached_runtimes() {
    let harness = loader_harness();
    let a = create_patient(&harness, "s1");
    let b = create_patient(&harness, "s2");
    assert_eq!(harness.cache.len(), 2);

    harness.loader.clear();

    assert!(harness.cache.is_empty());
    assert!(!a.quad_model().expect("quad").runtime().is_running());
    assert!(!b.quad_model().expect("quad").runtime().is_running());
}

/// Verifies create with `_initEntity` seeds the target param before persisting.
#[test]
fn create_with_init_entity_seeds_target() {
    let harness = loader_harness();
    let cmd = cmd("patient", Action::New)
        .with_param("fn", "_initEntity")
        .with_param("target", "/address")
        .with_param("json", r#"{"city":"Springfield","zip":"01101"}"#);
    let ctx = load(&harness, cmd, "s1").context;

    let state = ctx.quad_model().expect("quad").read();
    let city = state.find(TreeKind::Core, "/address/city").expect("city");
    assert_eq!(state.leaf_state(city).expect("city"), json!("Springfield"));
    let name = state.find(TreeKind::Core, "/name").expect("name");
    assert_eq!(state.leaf_state(name).expect("name"), json!(null));

    let persisted = harness
        .gateway
        .load("patient", "1")
        .expect("load")
        .expect("persisted");
    assert_eq!(persisted["address"]["zip"], json!("01101"));
}

/// Verifies create rejects handler-assigned state that violates the param schema.
#[test]
fn create_with_invalid_initial_state_is_not_persisted() {
    let harness = loader_harness();
    let cmd = cmd("patient", Action::New)
        .with_param("fn", "_initEntity")
        .with_param("target", "/age")
        .with_param("json", "-5");
    let err = harness.loader.load(&cmd, "s1").expect_err("schema minimum");

    assert!(matches!(err, RuntimeError::Validation { ref path, .. } if path == "/age"));
    assert!(harness.gateway.is_empty());
    assert!(harness.cache.is_empty());
}

/// Verifies a reloaded entity is served from the session cache afterwards.
#[test]
fn reload_then_load_same_session_hits_cache() {
    let harness = loader_harness();
    create_patient(&harness, "s1");

    let reloaded = load(&harness, cmd("patient", Action::Get).with_ref_id("1"), "s2");
    assert_eq!(reloaded.strategy, Acquisition::Reload);

    let again = load(&harness, cmd("patient", Action::Get).with_ref_id("1"), "s2");
    assert_eq!(again.strategy, Acquisition::CacheHit);
    assert!(Arc::ptr_eq(
        again.context.quad_model().expect("quad"),
        reloaded.context.quad_model().expect("quad")
    ));
    assert_eq!(harness.fetches.calls(), 1);
}

/// Verifies fetching an entity that was never created is a lookup error.
#[test]
fn fetch_of_unknown_entity_is_lookup_error() {
    let harness = loader_harness();
    let err = harness
        .loader
        .load(&cmd("patient", Action::Get).with_ref_id("404"), "s1")
        .expect_err("unknown entity");
    assert!(err.is_lookup());
    assert!(harness.cache.is_empty());
}

/// Verifies `load_current` takes the session id from the provider.
#[test]
fn load_current_uses_provider_session() {
    let harness = loader_harness();
    let created = create_patient(&harness, "s9");

    let ctx = harness
        .loader
        .load_current(
            &cmd("patient", Action::Get).with_ref_id("1"),
            &FixedSessionProvider("s9".to_string()),
        )
        .expect("load");
    assert!(Arc::ptr_eq(
        ctx.quad_model().expect("quad"),
        created.quad_model().expect("quad")
    ));
}

/// Verifies a reject policy surfaces a conflicting device-cache insert.
#[test]
fn reject_policy_fails_second_create_with_same_id() {
    let harness = loader_harness_with(InMemorySessionCache::new(4, ConflictPolicy::Reject));
    create_patient(&harness, "s1");

    let err = harness
        .loader
        .load(&cmd("patient", Action::New).with_ref_id("1"), "s1")
        .expect_err("conflict");
    assert!(matches!(err, RuntimeError::CacheConflict(_)));
}
