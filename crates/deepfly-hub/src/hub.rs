//! The assembled hub.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use deepfly_config::{HubConfig, ModuleSourceKind, StoreBackend};
use deepfly_events::EventBus;
use deepfly_storage::{FileKvStore, KvStore, MemoryKvStore, StorageError, StorageResult};
use tokio::task::JoinHandle;
use tracing::info;

use crate::capabilities::CapabilityFactory;
use crate::container::Container;
use crate::error::HubResult;
use crate::frames::FrameClock;
use crate::keyboard::Keyboard;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::loader::Loader;
use crate::registry::ModuleRegistry;
use crate::router::{Location, MemoryLocation, RouteOutcome, Router};
use crate::slug::Slug;
use crate::source::{BundledSource, ModuleSource};

/// Registry, loader, lifecycle and router wired to shared services.
pub struct Hub {
    registry: Arc<ModuleRegistry>,
    lifecycle: Arc<Lifecycle>,
    router: Arc<Router>,
    location: Arc<MemoryLocation>,
    bus: EventBus,
    frames: FrameClock,
    keyboard: Keyboard,
    store: Arc<dyn KvStore>,
    fps: u32,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("registry", &self.registry)
            .field("state", &self.lifecycle.state())
            .field("token", &self.location.token())
            .field("fps", &self.fps)
            .finish_non_exhaustive()
    }
}

/// Pick the module source `config` asks for.
///
/// `bundled` is used for [`ModuleSourceKind::Bundled`], and as the fallback
/// when dynamic libraries are requested but the `dylib` feature is off.
#[must_use]
pub fn source_for(config: &HubConfig, bundled: BundledSource) -> Arc<dyn ModuleSource> {
    match config.modules.source {
        ModuleSourceKind::Bundled => Arc::new(bundled),
        #[cfg(feature = "dylib")]
        ModuleSourceKind::Dylib => Arc::new(crate::source::DylibSource::new()),
        #[cfg(not(feature = "dylib"))]
        ModuleSourceKind::Dylib => {
            tracing::warn!(
                "dylib module source requested but not compiled in, using bundled units"
            );
            Arc::new(bundled)
        },
    }
}

fn open_store(config: &HubConfig) -> StorageResult<Arc<dyn KvStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryKvStore::new())),
        StoreBackend::File => {
            let path = config.store.path.as_ref().ok_or_else(|| {
                StorageError::Internal("file store backend requires store.path".to_owned())
            })?;
            Ok(Arc::new(FileKvStore::open(path)?))
        },
    }
}

impl Hub {
    /// Build a hub with its own registry.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the configured store cannot be opened.
    pub fn from_config(config: &HubConfig, source: Arc<dyn ModuleSource>) -> StorageResult<Self> {
        Self::with_registry(config, source, Arc::new(ModuleRegistry::new()))
    }

    /// Build a hub over an existing registry, such as
    /// [`ModuleRegistry::global`].
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the configured store cannot be opened.
    pub fn with_registry(
        config: &HubConfig,
        source: Arc<dyn ModuleSource>,
        registry: Arc<ModuleRegistry>,
    ) -> StorageResult<Self> {
        let store = open_store(config)?;
        let bus = EventBus::new();
        let frames = FrameClock::new();
        let keyboard = Keyboard::new();

        let loader = Loader::new(Arc::clone(&registry), source, config.modules.root.clone())
            .with_retry_failed(config.modules.retry_failed_fetches)
            .with_fetch_timeout(config.modules.fetch_timeout())
            .with_event_bus(bus.clone());
        let capabilities = CapabilityFactory::new(
            Arc::clone(&store),
            bus.clone(),
            frames.clone(),
            keyboard.clone(),
        )
        .with_namespace_prefix(config.store.namespace_prefix.clone());
        let lifecycle = Arc::new(
            Lifecycle::new(Arc::new(loader), capabilities, Container::new())
                .with_notice_duration(Duration::from_millis(config.notices.duration_ms)),
        );

        let location = Arc::new(MemoryLocation::default());
        let router = Arc::new(Router::new(
            Arc::clone(&lifecycle),
            Arc::clone(&location) as Arc<dyn Location>,
            bus.clone(),
        ));

        info!(
            root = %config.modules.root.display(),
            source = ?config.modules.source,
            store = ?config.store.backend,
            "Hub assembled"
        );
        Ok(Self {
            registry,
            lifecycle,
            router,
            location,
            bus,
            frames,
            keyboard,
            store,
            fps: config.frames.fps,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start following navigation events and driving the frame clock.
    /// Must be called inside a tokio runtime; calling it twice is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }
        tasks.push(Arc::clone(&self.router).listen());
        tasks.push(self.frames.drive(self.fps));
        info!(fps = self.fps, "Hub started");
    }

    /// Stop background tasks. The active module stays mounted.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Whether [`Hub::start`] is in effect.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Open `slug` and point the token at it.
    ///
    /// # Errors
    ///
    /// See [`Lifecycle::open`].
    pub async fn open(&self, slug: &str) -> HubResult<RouteOutcome> {
        self.router.open(slug).await
    }

    /// Close the active module and clear the token.
    pub async fn close(&self) -> RouteOutcome {
        self.router.close().await
    }

    /// Navigate the location to `token`, as following a link would. The
    /// router applies it once [`Hub::start`] has been called.
    pub fn navigate(&self, token: &str) {
        self.location.push(token);
    }

    /// History back. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        self.location.back()
    }

    /// History forward. Returns `false` at the end of history.
    pub fn forward(&self) -> bool {
        self.location.forward()
    }

    /// Slug of the active module.
    #[must_use]
    pub fn active_slug(&self) -> Option<Slug> {
        self.lifecycle.active_slug()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Current navigation token.
    #[must_use]
    pub fn token(&self) -> String {
        self.location.token()
    }

    /// Wait until the lifecycle state satisfies `predicate`.
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> LifecycleState
    where
        F: FnMut(&LifecycleState) -> bool,
    {
        let mut states = self.lifecycle.subscribe();
        match states.wait_for(|state| predicate(state)).await {
            Ok(state) => state.clone(),
            Err(_) => self.lifecycle.state(),
        }
    }

    /// The module registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// The lifecycle manager.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// The router.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The in-process location.
    #[must_use]
    pub fn location(&self) -> &Arc<MemoryLocation> {
        &self.location
    }

    /// The container modules mount into.
    #[must_use]
    pub fn container(&self) -> &Container {
        self.lifecycle.container()
    }

    /// The hub event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The shared frame clock.
    #[must_use]
    pub fn frames(&self) -> &FrameClock {
        &self.frames
    }

    /// The global keyboard surface.
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

impl Drop for Hub {
    fn drop(&mut self) {
        self.stop();
    }
}
