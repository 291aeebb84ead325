//! Integration tests running the bundled games inside a real hub.

use std::sync::Arc;

use deepfly_config::{HubConfig, ModuleSourceKind, StoreBackend};
use deepfly_hub::{Container, Hub, KeyEvent, source_for};
use deepfly_storage::ScopedKvStore;
use deepfly_test::{init_test_tracing, test_config, test_hub, test_hub_with};

fn text_of(container: &Container, kind: &str) -> String {
    container
        .nodes()
        .into_iter()
        .find(|n| n.kind == kind)
        .map(|n| n.text)
        .unwrap_or_default()
}

fn file_config(dir: &tempfile::TempDir) -> HubConfig {
    let mut config = test_config();
    config.store.backend = StoreBackend::File;
    config.store.path = Some(dir.path().join("store.json"));
    config
}

#[tokio::test]
async fn pong_runs_and_cleans_up() {
    init_test_tracing();
    let hub = test_hub(deepfly_games::catalog());

    hub.open("pong").await.unwrap();
    assert_eq!(hub.registry().get("pong").unwrap().manifest().name, "Pong");
    assert_eq!(hub.token(), "#game=pong");
    assert_eq!(text_of(hub.container(), "button"), "AI: on");

    hub.keyboard().dispatch(&KeyEvent::down("i"));
    assert_eq!(text_of(hub.container(), "button"), "AI: off");
    for _ in 0..10 {
        assert_eq!(hub.frames().tick(), 1);
    }
    assert_eq!(text_of(hub.container(), "score"), "0 : 0");

    hub.close().await;
    assert!(hub.container().is_empty());
    assert_eq!(hub.keyboard().listener_count(), 0);
    assert_eq!(hub.container().pointer_listener_count(), 0);
    assert_eq!(hub.frames().pending(), 0);
}

#[tokio::test]
async fn switching_games_releases_the_previous_one() {
    let hub = test_hub(deepfly_games::catalog());

    hub.open("pong").await.unwrap();
    hub.open("runner").await.unwrap();

    assert_eq!(hub.keyboard().listener_count(), 1);
    assert_eq!(hub.container().pointer_listener_count(), 1);
    assert_eq!(hub.frames().pending(), 1);
    assert_eq!(text_of(hub.container(), "score"), "Score: 0");
    assert!(text_of(hub.container(), "button").is_empty());
}

#[tokio::test]
async fn unknown_game_is_a_load_error() {
    let hub = test_hub(deepfly_games::catalog());
    let err = hub.open("tetris").await.unwrap_err();
    assert_eq!(err.slug(), "tetris");
    assert!(err.to_string().contains("network failure"), "{err}");
}

#[tokio::test]
async fn runner_best_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);

    {
        let hub = Hub::from_config(&config, Arc::new(deepfly_games::catalog())).unwrap();
        let store = ScopedKvStore::new(
            Arc::clone(hub.store()),
            config.store.namespace_for("runner"),
        )
        .unwrap();
        store.set_json("best", &12u32).await.unwrap();
    }

    let hub = Hub::from_config(&config, Arc::new(deepfly_games::catalog())).unwrap();
    hub.open("runner").await.unwrap();
    for _ in 0..200 {
        hub.frames().tick();
    }
    let status = text_of(hub.container(), "score");
    assert!(status.ends_with("(best: 12)"), "{status}");
}

#[tokio::test]
async fn games_keep_to_their_own_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);
    let hub = test_hub_with(&config, Arc::new(deepfly_games::catalog()));

    let pong = ScopedKvStore::new(Arc::clone(hub.store()), config.store.namespace_for("pong"))
        .unwrap();
    pong.set_json("best", &99u32).await.unwrap();

    hub.open("runner").await.unwrap();
    for _ in 0..200 {
        hub.frames().tick();
    }
    let status = text_of(hub.container(), "score");
    assert!(!status.ends_with("(best: 99)"), "{status}");
}

#[tokio::test]
async fn dylib_request_falls_back_to_bundled_units() {
    let mut config = test_config();
    config.modules.source = ModuleSourceKind::Dylib;
    let source = source_for(&config, deepfly_games::catalog());
    let hub = test_hub_with(&config, source);

    hub.open("pong").await.unwrap();
    assert_eq!(hub.active_slug().unwrap().as_str(), "pong");
}
