//! The browsing location the router keeps in sync.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

pub(crate) const NAVIGATION_CHANNEL_CAPACITY: usize = 64;

/// The location changed, by the user or by the router itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    /// Token after the change.
    pub token: String,
}

/// Where the navigation token lives.
pub trait Location: Send + Sync {
    /// Current token (empty when no module is encoded).
    fn token(&self) -> String;

    /// Move to `token`. Implementations emit a [`NavigationEvent`] when the
    /// token actually changes, like assigning a URL fragment does.
    fn set_token(&self, token: &str);

    /// Navigation events from now on.
    fn subscribe(&self) -> broadcast::Receiver<NavigationEvent>;
}

#[derive(Debug)]
struct History {
    entries: Vec<String>,
    index: usize,
}

impl History {
    fn current(&self) -> String {
        self.entries.get(self.index).cloned().unwrap_or_default()
    }
}

/// In-process location with a browser-style history stack.
#[derive(Debug)]
pub struct MemoryLocation {
    history: Mutex<History>,
    events: broadcast::Sender<NavigationEvent>,
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new("")
    }
}

impl MemoryLocation {
    /// A location whose history holds only `initial`.
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(NAVIGATION_CHANNEL_CAPACITY);
        Self {
            history: Mutex::new(History {
                entries: vec![initial.into()],
                index: 0,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, token: String) {
        trace!(token = %token, "navigation");
        // No subscribers is fine.
        let _ = self.events.send(NavigationEvent { token });
    }

    /// Navigate to `token`, dropping any forward entries.
    ///
    /// Pushing the current token is a no-op and emits nothing.
    pub fn push(&self, token: impl Into<String>) {
        let token = token.into();
        {
            let mut history = self.lock();
            if history.current() == token {
                return;
            }
            let keep = history.index.saturating_add(1);
            history.entries.truncate(keep);
            history.entries.push(token.clone());
            history.index = keep;
        }
        self.emit(token);
    }

    /// Step back one entry. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        let token = {
            let mut history = self.lock();
            let Some(index) = history.index.checked_sub(1) else {
                return false;
            };
            history.index = index;
            history.current()
        };
        self.emit(token);
        true
    }

    /// Step forward one entry. Returns `false` at the end of history.
    pub fn forward(&self) -> bool {
        let token = {
            let mut history = self.lock();
            let index = history.index.saturating_add(1);
            if index >= history.entries.len() {
                return false;
            }
            history.index = index;
            history.current()
        };
        self.emit(token);
        true
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.lock().entries.clone()
    }

    /// Position of the current entry in [`MemoryLocation::entries`].
    #[must_use]
    pub fn index(&self) -> usize {
        self.lock().index
    }
}

impl Location for MemoryLocation {
    fn token(&self) -> String {
        self.lock().current()
    }

    fn set_token(&self, token: &str) {
        self.push(token);
    }

    fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.events.subscribe()
    }
}
