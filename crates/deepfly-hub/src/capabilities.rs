//! The capability object handed to a module at mount time.

use std::sync::Arc;

use deepfly_events::{EventBus, ModuleBus};
use deepfly_storage::{KvStore, ScopedKvStore};

use crate::container::Container;
use crate::error::{HubError, HubResult};
use crate::frames::FrameClock;
use crate::keyboard::Keyboard;
use crate::slug::Slug;

/// Everything a mounted module may touch besides its container.
///
/// `store` and `bus` are scoped to the module's slug, so two modules can use
/// the same keys and topics without seeing each other.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// The module's container (same surface as the `mount` argument).
    pub root: Container,
    /// Persistent key/value store, namespaced `<prefix>game.<slug>`.
    pub store: ScopedKvStore,
    /// Private event channel.
    pub bus: ModuleBus,
    /// Per-frame callback scheduler.
    pub frames: FrameClock,
    /// Global keyboard surface.
    pub keyboard: Keyboard,
}

/// Produces a fresh [`Capabilities`] for every mount.
#[derive(Clone)]
pub struct CapabilityFactory {
    store: Arc<dyn KvStore>,
    bus: EventBus,
    frames: FrameClock,
    keyboard: Keyboard,
    namespace_prefix: String,
}

impl std::fmt::Debug for CapabilityFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityFactory")
            .field("namespace_prefix", &self.namespace_prefix)
            .field("frames", &self.frames)
            .field("keyboard", &self.keyboard)
            .finish_non_exhaustive()
    }
}

/// Default store namespace prefix.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "deepfly.";

impl CapabilityFactory {
    /// Wire the shared services every module's capabilities draw from.
    #[must_use]
    pub fn new(
        store: Arc<dyn KvStore>,
        bus: EventBus,
        frames: FrameClock,
        keyboard: Keyboard,
    ) -> Self {
        Self {
            store,
            bus,
            frames,
            keyboard,
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_owned(),
        }
    }

    /// Override the store namespace prefix.
    #[must_use]
    pub fn with_namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = prefix.into();
        self
    }

    /// Store namespace for `slug`.
    #[must_use]
    pub fn namespace_for(&self, slug: &Slug) -> String {
        format!("{}game.{slug}", self.namespace_prefix)
    }

    /// Build capabilities for one mount of `slug` into `container`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Mount`] if the store namespace is rejected.
    pub fn create(&self, slug: &Slug, container: &Container) -> HubResult<Capabilities> {
        let store = ScopedKvStore::new(Arc::clone(&self.store), self.namespace_for(slug))
            .map_err(|e| HubError::mount(slug.as_str(), e.to_string()))?;
        Ok(Capabilities {
            root: container.clone(),
            store,
            bus: ModuleBus::new(self.bus.clone(), slug.as_str()),
            frames: self.frames.clone(),
            keyboard: self.keyboard.clone(),
        })
    }

    /// The shared event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The shared frame clock.
    #[must_use]
    pub fn frames(&self) -> &FrameClock {
        &self.frames
    }

    /// The shared keyboard surface.
    #[must_use]
    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }
}
