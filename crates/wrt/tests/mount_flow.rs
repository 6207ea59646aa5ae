#![forbid(unsafe_code)]

//! End-to-end mount, render, analytics and teardown against an in-memory page.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use serde_json::json;
use wrt::core::{MemoryHost, OwnershipKey, OwnershipRegistry};
use wrt::events::{ConsentSource, ConsentState, DispatchOutcome};
use wrt::guard::StaticTrustedTypes;
use wrt::router::{HistoryMode, RouteTakeover, SetPlanOptions, View};
use wrt::{AnalyticsEvent, EmbedRuntime, MountError, RuntimeConfig};

type Sink = Rc<RefCell<Vec<AnalyticsEvent>>>;
type Runtime = EmbedRuntime<Rc<MemoryHost>>;

fn page(href: &str) -> Rc<MemoryHost> {
    Rc::new(MemoryHost::at(href).unwrap())
}

fn path_config(id: &str) -> RuntimeConfig {
    let mut config = RuntimeConfig::for_embed(id);
    config.router.history_mode = HistoryMode::Path;
    config.router.route_takeover = RouteTakeover::Document;
    config
}

fn mount(
    host: &Rc<MemoryHost>,
    registry: &OwnershipRegistry,
    trusted: &StaticTrustedTypes,
    config: RuntimeConfig,
) -> (Result<Runtime, MountError>, Sink) {
    let sink: Sink = Rc::default();
    let delivered = Rc::clone(&sink);
    let runtime = EmbedRuntime::mount(
        Rc::clone(host),
        trusted,
        registry.clone(),
        config,
        move |event| delivered.borrow_mut().push(event),
    );
    (runtime, sink)
}

#[test]
fn enforced_page_aborts_before_touching_anything() {
    let host = page("https://shop.example/events/jazz-night");
    let registry = OwnershipRegistry::new();
    let (result, _) = mount(
        &host,
        &registry,
        &StaticTrustedTypes::Rejecting("policy name not allowed".into()),
        path_config("lineup"),
    );

    assert!(matches!(result, Err(MountError::TrustedContentEnforced)));
    assert_eq!(registry.claimed_count(), 0);
    assert_eq!(host.listener_count(), 0);
    assert_eq!(host.push_count() + host.replace_count(), 0);
}

#[test]
fn invalid_config_is_rejected_without_claims() {
    let host = page("https://shop.example/events");
    let registry = OwnershipRegistry::new();
    let mut config = path_config("lineup");
    config.buffer.max_items = 0;
    let (result, _) = mount(&host, &registry, &StaticTrustedTypes::Absent, config);

    match result {
        Err(MountError::InvalidConfig(problems)) => {
            assert_eq!(problems, vec!["buffer.max_items must be > 0".to_owned()]);
        }
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
    assert_eq!(registry.claimed_count(), 0);
}

#[test]
fn mounted_router_reflects_location_and_claims() {
    let host = page("https://shop.example/events/jazz-night");
    let registry = OwnershipRegistry::new();
    let (runtime, _) = mount(&host, &registry, &StaticTrustedTypes::Absent, path_config("lineup"));
    let runtime = runtime.unwrap();

    let route = runtime.router().current_route();
    assert_eq!(route.view, View::Detail);
    assert_eq!(route.slug.as_deref(), Some("jazz-night"));
    assert_eq!(
        registry.owner(OwnershipKey::PathRouting).as_deref(),
        Some(runtime.router().owner_id())
    );
    assert_eq!(runtime.consent(), ConsentState::Pending);
}

#[test]
fn markup_goes_through_policy_when_available() {
    let host = page("https://shop.example/");
    let registry = OwnershipRegistry::new();
    let (runtime, _) = mount(
        &host,
        &registry,
        &StaticTrustedTypes::Permissive,
        RuntimeConfig::for_embed("lineup"),
    );
    let runtime = runtime.unwrap();

    let markup = runtime
        .render_markup(r#"<p onclick="steal()">Doors 7pm<script>alert(1)</script></p>"#)
        .unwrap();
    assert!(markup.is_trusted());
    assert_eq!(markup.as_str(), "<p>Doors 7pm</p>");
    assert!(!runtime.render_text("<b>").contains('<'));
}

#[test]
fn analytics_wait_for_consent_then_flush_in_order() {
    let host = page("https://shop.example/");
    let registry = OwnershipRegistry::new();
    let (runtime, sink) = mount(
        &host,
        &registry,
        &StaticTrustedTypes::Absent,
        RuntimeConfig::for_embed("lineup"),
    );
    let runtime = runtime.unwrap();

    for n in 0..3 {
        assert_eq!(
            runtime.track(json!({"event": "view", "n": n})),
            Some(DispatchOutcome::Buffered)
        );
    }
    assert!(sink.borrow().is_empty());
    assert_eq!(runtime.pending_analytics(), 3);

    assert!(runtime.grant_consent(ConsentSource::User));
    assert!(!runtime.grant_consent(ConsentSource::Host));
    let ns: Vec<_> = sink.borrow().iter().map(|e| e["n"].clone()).collect();
    assert_eq!(ns, vec![json!(0), json!(1), json!(2)]);

    assert_eq!(
        runtime.track(json!({"event": "click"})),
        Some(DispatchOutcome::Delivered)
    );
    assert!(runtime.revoke_consent());
    assert_eq!(
        runtime.track(json!({"event": "late"})),
        Some(DispatchOutcome::Buffered)
    );
    assert_eq!(sink.borrow().len(), 4);
}

#[test]
fn consent_granted_by_config_delivers_immediately() {
    let host = page("https://shop.example/");
    let registry = OwnershipRegistry::new();
    let mut config = RuntimeConfig::for_embed("lineup");
    config.consent = ConsentState::Granted;
    let (runtime, sink) = mount(&host, &registry, &StaticTrustedTypes::Absent, config);
    let runtime = runtime.unwrap();

    assert_eq!(
        runtime.track(json!({"event": "view"})),
        Some(DispatchOutcome::Delivered)
    );
    assert_eq!(sink.borrow().len(), 1);
}

#[test]
fn plan_written_by_runtime_reads_back() {
    let host = page("https://shop.example/events?ref=mail");
    let registry = OwnershipRegistry::new();
    let (runtime, _) = mount(
        &host,
        &registry,
        &StaticTrustedTypes::Absent,
        RuntimeConfig::for_embed("lineup"),
    );
    let mut runtime = runtime.unwrap();

    let plan = json!({"saved": ["jazz-night", "open-air"], "day": 2});
    let write = runtime
        .router_mut()
        .set_plan(&plan, SetPlanOptions::default())
        .unwrap();
    assert!(write.landed());
    assert!(host.href().contains("ref=mail"));
    assert_eq!(runtime.router().current_plan().unwrap(), Some(plan));
}

#[test]
fn destroy_releases_everything_once() {
    let host = page("https://shop.example/events");
    let registry = OwnershipRegistry::new();
    let (runtime, sink) = mount(&host, &registry, &StaticTrustedTypes::Absent, path_config("lineup"));
    let mut runtime = runtime.unwrap();
    runtime.track(json!({"event": "view"}));

    assert!(runtime.destroy());
    assert!(!runtime.destroy());
    assert!(runtime.is_destroyed());
    assert_eq!(registry.claimed_count(), 0);
    assert_eq!(host.listener_count(), 0);
    assert_eq!(runtime.pending_analytics(), 0);
    assert_eq!(runtime.track(json!({"event": "late"})), None);

    runtime.grant_consent(ConsentSource::User);
    assert!(sink.borrow().is_empty());
}
