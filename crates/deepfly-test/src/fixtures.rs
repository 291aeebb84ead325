//! Ready-made configurations and hubs.

use std::sync::Arc;
use std::time::Duration;

use deepfly_config::{HubConfig, ModulesConfig};
use deepfly_hub::{Hub, LifecycleState, ModuleSource};

/// Defaults with an in-memory store and a modules root that does not exist
/// on disk.
#[must_use]
pub fn test_config() -> HubConfig {
    HubConfig {
        modules: ModulesConfig {
            root: "/nonexistent/deepfly".into(),
            ..ModulesConfig::default()
        },
        ..HubConfig::default()
    }
}

/// A hub over `source` built from [`test_config`].
///
/// # Panics
///
/// Never in practice: the in-memory store cannot fail to open.
#[must_use]
pub fn test_hub(source: impl ModuleSource + 'static) -> Hub {
    test_hub_with(&test_config(), Arc::new(source))
}

/// A hub over `source` built from `config`.
///
/// # Panics
///
/// If the configured store cannot be opened.
#[must_use]
pub fn test_hub_with(config: &HubConfig, source: Arc<dyn ModuleSource>) -> Hub {
    Hub::from_config(config, source).unwrap_or_else(|e| panic!("failed to build test hub: {e}"))
}

/// Wait up to `timeout` for the hub's lifecycle to satisfy `predicate`.
///
/// # Panics
///
/// If the timeout elapses first.
pub async fn settle<F>(hub: &Hub, timeout: Duration, predicate: F) -> LifecycleState
where
    F: FnMut(&LifecycleState) -> bool,
{
    tokio::time::timeout(timeout, hub.wait_for_state(predicate))
        .await
        .unwrap_or_else(|_| panic!("hub did not settle within {timeout:?}: {:?}", hub.state()))
}
