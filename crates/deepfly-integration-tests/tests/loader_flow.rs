//! Integration tests for fetching and registering modules on demand.

use std::sync::Arc;
use std::time::Duration;

use deepfly_hub::{HubError, LoadFailure, ModuleDescriptor, ModuleManifest, RouteOutcome, Slug};
use deepfly_test::{MockModule, ScriptedSource, Tally, test_config, test_hub_with};

fn load_failure(err: &HubError) -> &LoadFailure {
    match err {
        HubError::ModuleLoad { reason, .. } => reason,
        other => panic!("expected a load failure, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_loads_share_one_fetch() {
    let tally = Tally::new();
    let source = Arc::new(
        ScriptedSource::new()
            .with_module("pong", MockModule::new("pong", &tally))
            .with_delay(Duration::from_millis(10)),
    );
    let hub = test_hub_with(&test_config(), source.clone());
    let loader = hub.lifecycle().loader();

    let results = futures::future::join_all((0..8).map(|_| loader.load("pong"))).await;
    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|m| m.slug.as_str() == "pong")));
    assert_eq!(source.fetch_count("pong"), 1);

    // Already registered: no further fetch.
    hub.open("pong").await.unwrap();
    assert_eq!(source.fetch_count("pong"), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_opens_of_one_slug_fetch_once() {
    let tally = Tally::new();
    let source = Arc::new(
        ScriptedSource::new()
            .with_module("pong", MockModule::new("pong", &tally))
            .with_delay(Duration::from_millis(10)),
    );
    let hub = test_hub_with(&test_config(), source.clone());

    let outcomes = futures::future::join_all((0..4).map(|_| hub.open("pong"))).await;
    assert_eq!(source.fetch_count("pong"), 1);
    assert_eq!(
        outcomes.last().unwrap().as_ref().unwrap(),
        &RouteOutcome::Opened(Slug::new("pong").unwrap())
    );
    assert_eq!(tally.live(), 1);
    assert_eq!(tally.peak_live(), 1);
}

#[tokio::test]
async fn unit_that_does_not_register() {
    let source = Arc::new(ScriptedSource::new().with_skip("lazy"));
    let hub = test_hub_with(&test_config(), source.clone());

    let err = hub.open("lazy").await.unwrap_err();
    assert_eq!(load_failure(&err), &LoadFailure::NotRegistered);
    assert!(hub.registry().is_empty());
}

#[tokio::test]
async fn failures_are_remembered_by_default() {
    let source = Arc::new(ScriptedSource::new().with_failure("down", "503 Service Unavailable"));
    let hub = test_hub_with(&test_config(), source.clone());

    for _ in 0..3 {
        let err = hub.open("down").await.unwrap_err();
        assert_eq!(
            load_failure(&err),
            &LoadFailure::Network("503 Service Unavailable".into())
        );
    }
    assert_eq!(source.fetch_count("down"), 1);
}

#[tokio::test]
async fn failures_are_retried_when_configured() {
    let mut config = test_config();
    config.modules.retry_failed_fetches = true;
    let source = Arc::new(ScriptedSource::new().with_failure("down", "offline"));
    let hub = test_hub_with(&config, source.clone());

    hub.open("down").await.unwrap_err();
    hub.open("down").await.unwrap_err();
    assert_eq!(source.fetch_count("down"), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out() {
    let mut config = test_config();
    config.modules.fetch_timeout_ms = 20;
    let tally = Tally::new();
    let source = Arc::new(
        ScriptedSource::new()
            .with_module("pong", MockModule::new("pong", &tally))
            .with_delay(Duration::from_secs(1)),
    );
    let hub = test_hub_with(&config, source);

    let err = hub.open("pong").await.unwrap_err();
    match load_failure(&err) {
        LoadFailure::Network(message) => assert!(message.contains("timed out"), "{message}"),
        other => panic!("unexpected failure: {other}"),
    }
    assert_eq!(tally.mounts(), 0);
}

#[tokio::test]
async fn invalid_slug_is_rejected_before_fetching() {
    let source = Arc::new(ScriptedSource::new());
    let hub = test_hub_with(&test_config(), source.clone());

    for bad in ["", "../pong", "po ng", "pong/x"] {
        let err = hub.open(bad).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidSlug { .. }), "{bad:?}: {err}");
    }
    assert_eq!(source.total_fetches(), 0);
}

#[tokio::test]
async fn descriptor_without_entry_point_fails_to_mount() {
    let slug = Slug::new("static").unwrap();
    let source = Arc::new(ScriptedSource::new().with_descriptor(
        "static",
        ModuleDescriptor::manifest_only(ModuleManifest::new(slug, "Static")),
    ));
    let hub = test_hub_with(&test_config(), source);

    let err = hub.open("static").await.unwrap_err();
    assert_eq!(load_failure(&err), &LoadFailure::MissingEntryPoint);
    assert!(hub.registry().contains("static"));
    assert_eq!(hub.token(), "");
}

#[tokio::test]
async fn first_registration_wins() {
    let tally = Tally::new();
    let hub = test_hub_with(&test_config(), Arc::new(ScriptedSource::new()));

    let slug = Slug::new("pong").unwrap();
    let first = ModuleDescriptor::new(
        ModuleManifest::new(slug.clone(), "First"),
        MockModule::new("first", &tally),
    );
    let second = ModuleDescriptor::new(
        ModuleManifest::new(slug.clone(), "Second"),
        MockModule::new("second", &tally),
    );
    assert!(hub.registry().register(slug.clone(), first));
    assert!(!hub.registry().register(slug, second));

    hub.open("pong").await.unwrap();
    assert_eq!(tally.log(), vec!["mount:first"]);
    assert_eq!(hub.registry().manifests()[0].name, "First");
}
