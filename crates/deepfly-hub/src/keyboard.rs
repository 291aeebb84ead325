//! The global keyboard surface.
//!
//! Listeners attached here outlive any container, so a module must remove
//! every listener it added before its `unmount` returns.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Whether a key went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    /// Key pressed.
    Down,
    /// Key released.
    Up,
}

/// A key event, named the way browsers name keys (`"w"`, `"ArrowUp"`, `" "`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Key name.
    pub key: String,
    /// Press or release.
    pub phase: KeyPhase,
}

impl KeyEvent {
    /// A key-down event.
    #[must_use]
    pub fn down(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            phase: KeyPhase::Down,
        }
    }

    /// A key-up event.
    #[must_use]
    pub fn up(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            phase: KeyPhase::Up,
        }
    }
}

type Listener = Arc<dyn Fn(&KeyEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// Shared keyboard surface. Clones refer to the same listener set.
#[derive(Clone, Default)]
pub struct Keyboard {
    inner: Arc<Mutex<Listeners>>,
}

impl std::fmt::Debug for Keyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyboard")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Keyboard {
    /// Create an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1);
        inner.entries.insert(id, Arc::new(listener));
        ListenerId(id)
    }

    /// Detach a listener. Returns `false` if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(&id.0)
            .is_some()
    }

    /// Deliver an event to every listener in registration order.
    ///
    /// Returns how many listeners saw it.
    pub fn dispatch(&self, event: &KeyEvent) -> usize {
        let listeners: Vec<Listener> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();
        trace!(key = %event.key, phase = ?event.phase, listeners = listeners.len(), "key dispatch");
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}
