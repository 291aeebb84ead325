//! Lifecycle manager: owns the single active-instance slot.
//!
//! State machine: `Idle → Mounting → Mounted → Unmounting → Idle`, plus
//! `Mounting → Idle` on failure.
//!
//! Every `open`/`close` takes a ticket from a monotonically increasing
//! request counter. The slot lock is only held to vacate, install or tear
//! down; loading and mounting run without it, so a newer request never waits
//! for an older one. A request whose ticket is no longer the latest is stale:
//! it gives up at its next checkpoint, and if its mount finishes after a newer
//! request arrived it unmounts that instance itself.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use deepfly_events::{EventBus, EventMetadata, HubEvent};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capabilities::CapabilityFactory;
use crate::container::Container;
use crate::error::{HubError, HubResult, LoadFailure};
use crate::loader::Loader;
use crate::module::MountHandle;
use crate::slug::Slug;

/// Default on-screen time for failure notices.
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_millis(2200);

/// Observable lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing mounted.
    Idle,
    /// `mount` is running for `slug`.
    Mounting {
        /// Module being mounted.
        slug: Slug,
    },
    /// `slug` is the active instance.
    Mounted {
        /// Active module.
        slug: Slug,
    },
    /// The active instance is being torn down.
    Unmounting {
        /// Module being unmounted.
        slug: Slug,
    },
}

impl LifecycleState {
    /// Slug involved in the state, if any.
    #[must_use]
    pub fn slug(&self) -> Option<&Slug> {
        match self {
            Self::Idle => None,
            Self::Mounting { slug } | Self::Mounted { slug } | Self::Unmounting { slug } => {
                Some(slug)
            },
        }
    }

    /// Whether nothing is mounted or in transition.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// How a successful `open` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The module is now the active instance.
    Mounted(Slug),
    /// A newer `open` or `close` arrived first; this request left no trace.
    Superseded,
}

/// How a `close` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The active instance was torn down.
    Unmounted,
    /// Nothing was mounted.
    AlreadyIdle,
    /// A newer request arrived first.
    Superseded,
}

struct ActiveInstance {
    slug: Slug,
    handle: Box<dyn MountHandle>,
}

#[derive(Default)]
struct Slot {
    active: Option<ActiveInstance>,
    /// An instance was torn down by an `open` that has not settled yet.
    vacated: bool,
}

/// Owns the active-instance slot and drives every transition.
pub struct Lifecycle {
    loader: Arc<Loader>,
    capabilities: CapabilityFactory,
    container: Container,
    slot: Mutex<Slot>,
    request: AtomicU64,
    state: watch::Sender<LifecycleState>,
    notice_duration: Duration,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &*self.state.borrow())
            .field("request", &self.request.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    /// A manager mounting into `container`.
    #[must_use]
    pub fn new(loader: Arc<Loader>, capabilities: CapabilityFactory, container: Container) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            loader,
            capabilities,
            container,
            slot: Mutex::new(Slot::default()),
            request: AtomicU64::new(0),
            state,
            notice_duration: DEFAULT_NOTICE_DURATION,
        }
    }

    /// How long failure notices should stay visible.
    #[must_use]
    pub fn with_notice_duration(mut self, duration: Duration) -> Self {
        self.notice_duration = duration;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Slug of the active instance.
    #[must_use]
    pub fn active_slug(&self) -> Option<Slug> {
        match &*self.state.borrow() {
            LifecycleState::Mounted { slug } => Some(slug.clone()),
            _ => None,
        }
    }

    /// The container modules mount into.
    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The loader resolving descriptors.
    #[must_use]
    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    fn bus(&self) -> &EventBus {
        self.capabilities.bus()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Supersede every request issued so far and return the new ticket.
    pub(crate) fn issue_ticket(&self) -> u64 {
        self.request.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    fn is_stale(&self, ticket: u64) -> bool {
        self.request.load(Ordering::SeqCst) != ticket
    }

    fn set_state(&self, state: LifecycleState) {
        debug!(state = ?state, "lifecycle transition");
        self.state.send_replace(state);
    }

    /// Make `slug` the active module.
    ///
    /// Unmounts the current instance, resolves the descriptor (loading it on
    /// first use), and mounts the new one with fresh capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidSlug`], [`HubError::ModuleLoad`] or
    /// [`HubError::Mount`]. On error the manager is idle (unless a newer
    /// request has taken over) and a notice has been published.
    pub async fn open(&self, slug: &str) -> HubResult<OpenOutcome> {
        let ticket = self.issue_ticket();
        self.open_with_ticket(slug, ticket, |_| {}).await
    }

    /// [`Lifecycle::open`] with a ticket taken earlier through
    /// [`Lifecycle::issue_ticket`].
    ///
    /// `settle` runs under the slot lock once this request takes effect:
    /// with the mounted slug, or with `None` when a failure left the manager
    /// idle after tearing an instance down. It never runs for a stale request.
    pub(crate) async fn open_with_ticket<F>(
        &self,
        slug: &str,
        ticket: u64,
        settle: F,
    ) -> HubResult<OpenOutcome>
    where
        F: FnOnce(Option<&Slug>),
    {
        debug!(slug, ticket, "open requested");
        match self.open_inner(slug, ticket).await {
            Ok(Some(active)) => Ok(self.install(ticket, active, settle)),
            Ok(None) => Ok(OpenOutcome::Superseded),
            Err(e) => {
                self.fail(ticket, &e, settle);
                Err(e)
            },
        }
    }

    /// Runs the open up to a finished mount. `None` means the request went
    /// stale before mounting.
    async fn open_inner(&self, slug: &str, ticket: u64) -> HubResult<Option<ActiveInstance>> {
        let slug = Slug::new(slug)?;
        if !self.vacate(ticket) {
            debug!(slug = %slug, ticket, "open superseded before load");
            return Ok(None);
        }

        let descriptor = self.loader.resolve(&slug).await?;

        let (entry, container) = {
            let _slot = self.lock_slot();
            if self.is_stale(ticket) {
                debug!(slug = %slug, ticket, "open superseded before mount");
                return Ok(None);
            }
            let entry = descriptor
                .entry_point()
                .cloned()
                .ok_or_else(|| HubError::load(slug.as_str(), LoadFailure::MissingEntryPoint))?;
            self.set_state(LifecycleState::Mounting { slug: slug.clone() });
            self.container.clear();
            (entry, self.container.clone())
        };
        let caps = self.capabilities.create(&slug, &container)?;

        let mounted = match std::panic::catch_unwind(AssertUnwindSafe(|| entry.mount(container, caps)))
        {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };
        match mounted {
            Ok(Ok(handle)) => Ok(Some(ActiveInstance { slug, handle })),
            Ok(Err(e)) => Err(HubError::mount(slug.as_str(), e.to_string())),
            Err(panic) => Err(HubError::mount(slug.as_str(), panic_message(&*panic))),
        }
    }

    /// Tear down the active instance on behalf of `ticket`. Returns `false`
    /// if the ticket is already stale.
    fn vacate(&self, ticket: u64) -> bool {
        let mut slot = self.lock_slot();
        if self.is_stale(ticket) {
            return false;
        }
        if let Some(active) = slot.active.take() {
            self.teardown(active);
            slot.vacated = true;
        }
        true
    }

    fn install<F>(&self, ticket: u64, active: ActiveInstance, settle: F) -> OpenOutcome
    where
        F: FnOnce(Option<&Slug>),
    {
        let mut slot = self.lock_slot();
        if self.is_stale(ticket) {
            drop(slot);
            warn!(slug = %active.slug, ticket, "mount completed after being superseded, unmounting");
            self.unmount(active);
            return OpenOutcome::Superseded;
        }

        let slug = active.slug.clone();
        // Only the current ticket installs, and it vacated the slot first.
        slot.active = Some(active);
        slot.vacated = false;
        self.set_state(LifecycleState::Mounted { slug: slug.clone() });
        info!(slug = %slug, "Module mounted");
        self.bus().publish(HubEvent::ModuleMounted {
            metadata: EventMetadata::new("lifecycle"),
            slug: slug.to_string(),
        });
        settle(Some(&slug));
        OpenOutcome::Mounted(slug)
    }

    /// Unmount the active instance, if any. Also supersedes any `open`
    /// still in flight without waiting for it.
    #[allow(clippy::unused_async)]
    pub async fn close(&self) -> CloseOutcome {
        let ticket = self.issue_ticket();
        self.close_with_ticket(ticket, || {})
    }

    /// Close on behalf of `ticket`. `settle` runs under the slot lock unless
    /// the ticket is stale.
    pub(crate) fn close_with_ticket<F>(&self, ticket: u64, settle: F) -> CloseOutcome
    where
        F: FnOnce(),
    {
        let mut slot = self.lock_slot();
        if self.is_stale(ticket) {
            debug!(ticket, "close superseded");
            return CloseOutcome::Superseded;
        }
        let outcome = match slot.active.take() {
            Some(active) => {
                self.teardown(active);
                CloseOutcome::Unmounted
            },
            None => CloseOutcome::AlreadyIdle,
        };
        slot.vacated = false;
        self.container.clear();
        self.set_state(LifecycleState::Idle);
        settle();
        outcome
    }

    fn fail<F>(&self, ticket: u64, error: &HubError, settle: F)
    where
        F: FnOnce(Option<&Slug>),
    {
        {
            let mut slot = self.lock_slot();
            if self.is_stale(ticket) {
                debug!(error = %error, ticket, "stale open failed, newer request owns the slot");
                return;
            }
            let mut vacated = std::mem::take(&mut slot.vacated);
            if let Some(active) = slot.active.take() {
                self.teardown(active);
                vacated = true;
            }
            self.container.clear();
            self.set_state(LifecycleState::Idle);
            if vacated {
                settle(None);
            }
        }

        warn!(slug = error.slug(), error = %error, "open failed");
        let bus = self.bus();
        bus.publish(HubEvent::OpenFailed {
            metadata: EventMetadata::new("lifecycle"),
            slug: error.slug().to_owned(),
            error: error.to_string(),
        });
        bus.publish(HubEvent::Notice {
            metadata: EventMetadata::new("lifecycle"),
            message: notice_text(error),
            duration_ms: u64::try_from(self.notice_duration.as_millis()).unwrap_or(u64::MAX),
        });
    }

    /// Tear down the active instance: unmount it, clear the container and
    /// go idle.
    fn teardown(&self, active: ActiveInstance) {
        self.set_state(LifecycleState::Unmounting {
            slug: active.slug.clone(),
        });
        self.unmount(active);
        self.container.clear();
        self.set_state(LifecycleState::Idle);
    }

    /// Call the instance's `unmount`. Never fails: errors and panics are
    /// logged and swallowed. Leaves state and container alone.
    fn unmount(&self, active: ActiveInstance) {
        let ActiveInstance { slug, handle } = active;
        let clean = match std::panic::catch_unwind(AssertUnwindSafe(|| handle.unmount())) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(slug = %slug, error = %e, "unmount failed, continuing");
                false
            },
            Err(panic) => {
                warn!(slug = %slug, panic = %panic_message(&*panic), "unmount panicked, continuing");
                false
            },
        };

        info!(slug = %slug, clean, "Module unmounted");
        self.bus().publish(HubEvent::ModuleUnmounted {
            metadata: EventMetadata::new("lifecycle"),
            slug: slug.to_string(),
            clean,
        });
    }
}

fn notice_text(error: &HubError) -> String {
    match error {
        HubError::InvalidSlug { slug, .. } => format!("Unknown game \"{slug}\""),
        HubError::ModuleLoad { slug, reason } => {
            format!("Could not load {slug}: {}", reason.reason())
        },
        HubError::Mount { slug, .. } => format!("{slug} failed to start"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "module panicked".to_owned())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use deepfly_storage::MemoryKvStore;

    use super::*;
    use crate::capabilities::Capabilities;
    use crate::container::Node;
    use crate::error::ModuleError;
    use crate::frames::FrameClock;
    use crate::keyboard::Keyboard;
    use crate::manifest::ModuleManifest;
    use crate::module::{GameModule, ModuleDescriptor};
    use crate::registry::ModuleRegistry;
    use crate::source::{FetchError, ModuleSource};

    #[derive(Default)]
    struct Counts {
        mounts: AtomicUsize,
        unmounts: AtomicUsize,
    }

    struct Handle {
        counts: Arc<Counts>,
        fail: bool,
    }

    impl MountHandle for Handle {
        fn unmount(self: Box<Self>) -> Result<(), ModuleError> {
            self.counts.unmounts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ModuleError::msg("leaked a listener"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Ok,
        Delay(u64),
        Reject,
        Panic,
        FailUnmount,
    }

    struct Fake {
        counts: Arc<Counts>,
        mode: Mode,
    }

    #[async_trait]
    impl GameModule for Fake {
        async fn mount(
            &self,
            container: Container,
            _caps: Capabilities,
        ) -> Result<Box<dyn MountHandle>, ModuleError> {
            container.append(Node::new("canvas", "partial"));
            match self.mode {
                Mode::Reject => return Err(ModuleError::msg("no canvas")),
                Mode::Panic => panic!("mount blew up"),
                Mode::Delay(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                Mode::Ok | Mode::FailUnmount => {},
            }
            self.counts.mounts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Handle {
                counts: Arc::clone(&self.counts),
                fail: self.mode == Mode::FailUnmount,
            }))
        }
    }

    struct NoSource;

    #[async_trait]
    impl ModuleSource for NoSource {
        async fn fetch_and_execute(
            &self,
            _slug: &Slug,
            path: &Path,
            _registry: &ModuleRegistry,
        ) -> Result<(), FetchError> {
            Err(FetchError::new(format!("{} unreachable", path.display())))
        }
    }

    struct Fixture {
        lifecycle: Lifecycle,
        registry: Arc<ModuleRegistry>,
        bus: EventBus,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(ModuleRegistry::new());
            let bus = EventBus::new();
            let loader = Arc::new(Loader::new(
                Arc::clone(&registry),
                Arc::new(NoSource),
                "/srv",
            ));
            let caps = CapabilityFactory::new(
                Arc::new(MemoryKvStore::new()),
                bus.clone(),
                FrameClock::new(),
                Keyboard::new(),
            );
            Self {
                lifecycle: Lifecycle::new(loader, caps, Container::new()),
                registry,
                bus,
            }
        }

        fn add(&self, slug: &str, mode: Mode) -> Arc<Counts> {
            let counts = Arc::new(Counts::default());
            let slug = Slug::new(slug).unwrap();
            self.registry.register(
                slug.clone(),
                ModuleDescriptor::new(
                    ModuleManifest::new(slug, "Fake"),
                    Fake {
                        counts: Arc::clone(&counts),
                        mode,
                    },
                ),
            );
            counts
        }
    }

    #[tokio::test]
    async fn open_then_close() {
        let fx = Fixture::new();
        let counts = fx.add("pong", Mode::Ok);

        let outcome = fx.lifecycle.open("pong").await.unwrap();
        assert_eq!(outcome, OpenOutcome::Mounted(Slug::new("pong").unwrap()));
        assert_eq!(fx.lifecycle.active_slug().unwrap().as_str(), "pong");
        assert!(!fx.lifecycle.container().is_empty());

        assert_eq!(fx.lifecycle.close().await, CloseOutcome::Unmounted);
        assert_eq!(counts.unmounts.load(Ordering::SeqCst), 1);
        assert!(fx.lifecycle.state().is_idle());
        assert!(fx.lifecycle.container().is_empty());
        assert_eq!(fx.lifecycle.close().await, CloseOutcome::AlreadyIdle);
        assert_eq!(counts.unmounts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn switching_unmounts_previous_first() {
        let fx = Fixture::new();
        let pong = fx.add("pong", Mode::Ok);
        let runner = fx.add("runner", Mode::Ok);

        fx.lifecycle.open("pong").await.unwrap();
        fx.lifecycle.open("runner").await.unwrap();

        assert_eq!(pong.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(runner.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.lifecycle.active_slug().unwrap().as_str(), "runner");
    }

    #[tokio::test]
    async fn mount_rejection_returns_to_idle() {
        let fx = Fixture::new();
        fx.add("broken", Mode::Reject);
        let mut events = fx.bus.subscribe();

        let err = fx.lifecycle.open("broken").await.unwrap_err();
        assert!(matches!(err, HubError::Mount { .. }));
        assert!(fx.lifecycle.state().is_idle());
        assert!(fx.lifecycle.container().is_empty());

        let kinds: Vec<&str> = events.drain().iter().map(|e| e.event_type()).collect();
        assert!(kinds.contains(&"open_failed"));
        assert!(kinds.contains(&"notice"));
    }

    #[tokio::test]
    async fn mount_panic_is_a_mount_error() {
        let fx = Fixture::new();
        fx.add("panicky", Mode::Panic);

        let err = fx.lifecycle.open("panicky").await.unwrap_err();
        assert_eq!(
            err,
            HubError::Mount {
                slug: "panicky".into(),
                message: "mount blew up".into()
            }
        );
        assert!(fx.lifecycle.active_slug().is_none());
        assert!(fx.lifecycle.container().is_empty());
    }

    #[tokio::test]
    async fn missing_entry_point_fails_at_mount_time() {
        let fx = Fixture::new();
        let slug = Slug::new("hollow").unwrap();
        fx.registry.register(
            slug.clone(),
            ModuleDescriptor::manifest_only(ModuleManifest::new(slug, "Hollow")),
        );

        assert!(fx.lifecycle.loader().load("hollow").await.is_ok());
        let err = fx.lifecycle.open("hollow").await.unwrap_err();
        assert_eq!(
            err,
            HubError::ModuleLoad {
                slug: "hollow".into(),
                reason: LoadFailure::MissingEntryPoint
            }
        );
    }

    #[tokio::test]
    async fn unmount_failure_does_not_block_next_open() {
        let fx = Fixture::new();
        let sloppy = fx.add("sloppy", Mode::FailUnmount);
        fx.add("pong", Mode::Ok);

        fx.lifecycle.open("sloppy").await.unwrap();
        fx.lifecycle.open("pong").await.unwrap();
        assert_eq!(sloppy.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.lifecycle.active_slug().unwrap().as_str(), "pong");
    }

    #[tokio::test]
    async fn load_failure_leaves_idle_and_notices() {
        let fx = Fixture::new();
        let pong = fx.add("pong", Mode::Ok);
        fx.lifecycle.open("pong").await.unwrap();
        let mut events = fx.bus.subscribe();

        let err = fx.lifecycle.open("missing").await.unwrap_err();
        assert!(matches!(
            err,
            HubError::ModuleLoad {
                reason: LoadFailure::Network(_),
                ..
            }
        ));
        assert!(fx.lifecycle.state().is_idle());
        assert_eq!(pong.unmounts.load(Ordering::SeqCst), 1);

        let notice = events
            .drain()
            .into_iter()
            .find(|e| e.event_type() == "notice")
            .unwrap();
        match &*notice {
            HubEvent::Notice {
                message,
                duration_ms,
                ..
            } => {
                assert_eq!(message, "Could not load missing: network failure");
                assert_eq!(*duration_ms, 2200);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_slug_rejected() {
        let fx = Fixture::new();
        let err = fx.lifecycle.open("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, HubError::InvalidSlug { .. }));
        assert!(fx.lifecycle.state().is_idle());
    }

    #[tokio::test]
    async fn newer_open_supersedes_slow_mount() {
        let fx = Fixture::new();
        let slow = fx.add("slow", Mode::Delay(50));
        let fast = fx.add("fast", Mode::Ok);
        let lifecycle = &fx.lifecycle;

        let (first, second) = tokio::join!(lifecycle.open("slow"), async {
            tokio::task::yield_now().await;
            lifecycle.open("fast").await
        });

        assert_eq!(first.unwrap(), OpenOutcome::Superseded);
        assert_eq!(
            second.unwrap(),
            OpenOutcome::Mounted(Slug::new("fast").unwrap())
        );
        assert_eq!(slow.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(slow.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(fast.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.active_slug().unwrap().as_str(), "fast");
    }

    #[tokio::test]
    async fn close_supersedes_inflight_open() {
        let fx = Fixture::new();
        let slow = fx.add("slow", Mode::Delay(30));
        let lifecycle = &fx.lifecycle;

        let (opened, closed) = tokio::join!(lifecycle.open("slow"), async {
            tokio::task::yield_now().await;
            lifecycle.close().await
        });

        assert_eq!(opened.unwrap(), OpenOutcome::Superseded);
        assert_eq!(closed, CloseOutcome::AlreadyIdle);
        assert_eq!(slow.unmounts.load(Ordering::SeqCst), 1);
        assert!(lifecycle.state().is_idle());
        assert!(lifecycle.container().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_does_not_wait_for_a_pending_mount() {
        let fx = Fixture::new();
        let slow = fx.add("slow", Mode::Delay(3_600_000));
        let lifecycle = &fx.lifecycle;

        let open = lifecycle.open("slow");
        tokio::pin!(open);
        tokio::select! {
            _ = &mut open => panic!("mount finished early"),
            () = tokio::time::sleep(Duration::from_millis(10)) => {},
        }
        assert_eq!(
            lifecycle.state(),
            LifecycleState::Mounting {
                slug: Slug::new("slow").unwrap()
            }
        );

        let closed = tokio::time::timeout(Duration::from_millis(100), lifecycle.close())
            .await
            .unwrap();
        assert_eq!(closed, CloseOutcome::AlreadyIdle);
        assert!(lifecycle.state().is_idle());

        assert_eq!(open.await.unwrap(), OpenOutcome::Superseded);
        assert_eq!(slow.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(slow.unmounts.load(Ordering::SeqCst), 1);
        assert!(lifecycle.state().is_idle());
    }

    #[tokio::test]
    async fn failure_settles_only_after_a_teardown() {
        let fx = Fixture::new();
        fx.add("pong", Mode::Ok);
        let settled = std::sync::Mutex::new(Vec::new());
        let record = |slug: Option<&Slug>| {
            settled.lock().unwrap().push(slug.map(ToString::to_string));
        };
        let lifecycle = &fx.lifecycle;

        let ticket = lifecycle.issue_ticket();
        lifecycle
            .open_with_ticket("missing", ticket, record)
            .await
            .unwrap_err();
        assert!(settled.lock().unwrap().is_empty());

        let ticket = lifecycle.issue_ticket();
        lifecycle.open_with_ticket("pong", ticket, record).await.unwrap();
        let ticket = lifecycle.issue_ticket();
        lifecycle
            .open_with_ticket("missing", ticket, record)
            .await
            .unwrap_err();
        assert_eq!(
            *settled.lock().unwrap(),
            vec![Some("pong".to_owned()), None]
        );
    }

    #[tokio::test]
    async fn stale_request_never_settles() {
        let fx = Fixture::new();
        fx.add("slow", Mode::Delay(30));
        let settled = AtomicUsize::new(0);
        let lifecycle = &fx.lifecycle;

        let ticket = lifecycle.issue_ticket();
        let (first, second) = tokio::join!(
            lifecycle.open_with_ticket("slow", ticket, |_| {
                settled.fetch_add(1, Ordering::SeqCst);
            }),
            async {
                tokio::task::yield_now().await;
                let ticket = lifecycle.issue_ticket();
                lifecycle.close_with_ticket(ticket, || {
                    settled.fetch_add(10, Ordering::SeqCst);
                })
            }
        );

        assert_eq!(first.unwrap(), OpenOutcome::Superseded);
        assert_eq!(second, CloseOutcome::AlreadyIdle);
        assert_eq!(settled.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn stale_mount_leaves_the_newer_instance_drawn() {
        let fx = Fixture::new();
        fx.add("slow", Mode::Delay(30));
        fx.add("fast", Mode::Ok);
        let lifecycle = &fx.lifecycle;

        let (first, second) = tokio::join!(lifecycle.open("slow"), async {
            tokio::task::yield_now().await;
            lifecycle.open("fast").await
        });
        assert_eq!(first.unwrap(), OpenOutcome::Superseded);
        second.unwrap();

        assert_eq!(lifecycle.active_slug().unwrap().as_str(), "fast");
        assert_eq!(lifecycle.container().len(), 1);
        assert_eq!(
            lifecycle.state(),
            LifecycleState::Mounted {
                slug: Slug::new("fast").unwrap()
            }
        );
    }
}
