//! Mock game modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deepfly_hub::{
    Capabilities, Container, FrameClock, FrameHandle, GameModule, Keyboard, ListenerId,
    ModuleError, MountHandle, Node, NodeId,
};

/// Shared record of what mock modules did.
///
/// Several modules can share one tally, which makes "how many instances are
/// alive right now" a global question.
#[derive(Debug, Default)]
pub struct Tally {
    mounts: AtomicUsize,
    unmounts: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl Tally {
    /// A fresh tally.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }

    fn mounted(&self, slug: &str) {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.peak_live.fetch_max(live, Ordering::SeqCst);
        self.record(format!("mount:{slug}"));
    }

    fn unmounted(&self, slug: &str) {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.record(format!("unmount:{slug}"));
    }

    /// Completed mounts.
    #[must_use]
    pub fn mounts(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    /// `unmount` calls.
    #[must_use]
    pub fn unmounts(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }

    /// Instances mounted and not yet unmounted.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live instances seen.
    #[must_use]
    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }

    /// `mount:<slug>` / `unmount:<slug>` entries in call order.
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Mount count for one slug.
    #[must_use]
    pub fn mounts_of(&self, slug: &str) -> usize {
        let entry = format!("mount:{slug}");
        self.log().iter().filter(|e| **e == entry).count()
    }
}

/// How a [`MockModule`] misbehaves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MockBehavior {
    /// Mount and unmount cleanly.
    #[default]
    Normal,
    /// `mount` returns an error after drawing a partial node.
    FailMount(String),
    /// `mount` panics after drawing a partial node.
    PanicMount,
    /// `unmount` returns an error after cleaning up.
    FailUnmount,
    /// `unmount` panics before cleaning up.
    PanicUnmount,
    /// `unmount` forgets to cancel the frame callback.
    LeakFrame,
}

/// A module that draws one node, holds one keyboard listener and one frame
/// callback, and reports to a [`Tally`].
#[derive(Debug, Clone)]
pub struct MockModule {
    slug: String,
    tally: Arc<Tally>,
    delay: Option<Duration>,
    behavior: MockBehavior,
}

impl MockModule {
    /// A well-behaved mock.
    #[must_use]
    pub fn new(slug: impl Into<String>, tally: &Arc<Tally>) -> Self {
        Self {
            slug: slug.into(),
            tally: Arc::clone(tally),
            delay: None,
            behavior: MockBehavior::Normal,
        }
    }

    /// Sleep this long inside `mount`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Misbehave as described.
    #[must_use]
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

#[async_trait]
impl GameModule for MockModule {
    async fn mount(
        &self,
        container: Container,
        caps: Capabilities,
    ) -> Result<Box<dyn MountHandle>, ModuleError> {
        let node = container.append(Node::new("mock", self.slug.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            MockBehavior::FailMount(message) => return Err(ModuleError::msg(message.clone())),
            MockBehavior::PanicMount => panic!("mock module {} panicked in mount", self.slug),
            _ => {},
        }

        let listener = caps.keyboard.add_listener(|_| {});
        let frame = caps.frames.request_frame(|_| {});
        self.tally.mounted(&self.slug);

        Ok(Box::new(CountingHandle {
            slug: self.slug.clone(),
            tally: Arc::clone(&self.tally),
            behavior: self.behavior.clone(),
            container,
            node,
            keyboard: caps.keyboard,
            listener,
            frames: caps.frames,
            frame,
        }))
    }
}

/// Handle returned by [`MockModule`]; counts its `unmount`.
pub struct CountingHandle {
    slug: String,
    tally: Arc<Tally>,
    behavior: MockBehavior,
    container: Container,
    node: NodeId,
    keyboard: Keyboard,
    listener: ListenerId,
    frames: FrameClock,
    frame: FrameHandle,
}

impl std::fmt::Debug for CountingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingHandle")
            .field("slug", &self.slug)
            .field("behavior", &self.behavior)
            .finish_non_exhaustive()
    }
}

impl MountHandle for CountingHandle {
    fn unmount(self: Box<Self>) -> Result<(), ModuleError> {
        self.tally.unmounted(&self.slug);
        if self.behavior == MockBehavior::PanicUnmount {
            panic!("mock module {} panicked in unmount", self.slug);
        }

        self.keyboard.remove_listener(self.listener);
        if self.behavior != MockBehavior::LeakFrame {
            self.frames.cancel(self.frame);
        }
        self.container.remove(self.node);

        if self.behavior == MockBehavior::FailUnmount {
            return Err(ModuleError::msg(format!("{} failed to clean up", self.slug)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use deepfly_events::EventBus;
    use deepfly_hub::{CapabilityFactory, Slug};
    use deepfly_storage::MemoryKvStore;

    use super::*;

    fn caps(container: &Container) -> (Capabilities, Keyboard, FrameClock) {
        let keyboard = Keyboard::new();
        let frames = FrameClock::new();
        let factory = CapabilityFactory::new(
            Arc::new(MemoryKvStore::new()),
            EventBus::new(),
            frames.clone(),
            keyboard.clone(),
        );
        let caps = factory
            .create(&Slug::new("mock").unwrap(), container)
            .unwrap();
        (caps, keyboard, frames)
    }

    #[tokio::test]
    async fn mount_and_unmount_are_counted() {
        let tally = Tally::new();
        let container = Container::new();
        let (caps, keyboard, frames) = caps(&container);

        let handle = MockModule::new("mock", &tally)
            .mount(container.clone(), caps)
            .await
            .unwrap();
        assert_eq!(tally.live(), 1);
        assert_eq!(keyboard.listener_count(), 1);
        assert_eq!(frames.pending(), 1);

        handle.unmount().unwrap();
        assert_eq!(tally.unmounts(), 1);
        assert_eq!(tally.live(), 0);
        assert_eq!(keyboard.listener_count(), 0);
        assert_eq!(frames.pending(), 0);
        assert!(container.is_empty());
        assert_eq!(tally.log(), vec!["mount:mock", "unmount:mock"]);
    }

    #[tokio::test]
    async fn leaky_module_keeps_its_frame() {
        let tally = Tally::new();
        let container = Container::new();
        let (caps, _keyboard, frames) = caps(&container);

        let handle = MockModule::new("mock", &tally)
            .with_behavior(MockBehavior::LeakFrame)
            .mount(container, caps)
            .await
            .unwrap();
        handle.unmount().unwrap();
        assert_eq!(frames.pending(), 1);
    }

    #[tokio::test]
    async fn failing_mount_is_not_counted() {
        let tally = Tally::new();
        let container = Container::new();
        let (caps, _keyboard, _frames) = caps(&container);

        let result = MockModule::new("mock", &tally)
            .with_behavior(MockBehavior::FailMount("no canvas".into()))
            .mount(container.clone(), caps)
            .await;
        assert!(result.is_err());
        assert_eq!(tally.mounts(), 0);
        assert_eq!(container.len(), 1);
    }
}
