//! The presentation surface a mounted module draws into.
//!
//! A headless stand-in for a DOM element: an ordered list of text nodes plus
//! pointer listeners scoped to the surface. Clearing the container drops both,
//! the way removing an element drops the listeners attached to it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::keyboard::ListenerId;

/// Identifies a node inside a [`Container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// A rendered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Role of the node (`"canvas"`, `"score"`, `"button"`).
    pub kind: String,
    /// Text content.
    pub text: String,
}

impl Node {
    /// A node of the given kind with initial text.
    #[must_use]
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }
}

/// A pointer position in surface coordinates, `0.0..=1.0` on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

type PointerListener = Arc<dyn Fn(PointerEvent) + Send + Sync>;

#[derive(Default)]
struct Surface {
    next_id: u64,
    nodes: Vec<(NodeId, Node)>,
    pointer: Vec<(ListenerId, PointerListener)>,
    next_listener: u64,
}

/// Shared handle to a presentation surface. Clones refer to the same surface.
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<Mutex<Surface>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let surface = self.lock();
        f.debug_struct("Container")
            .field("nodes", &surface.nodes.len())
            .field("pointer_listeners", &surface.pointer.len())
            .finish()
    }
}

impl Container {
    /// Create an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Surface> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove every node and pointer listener.
    pub fn clear(&self) {
        let mut surface = self.lock();
        surface.nodes.clear();
        surface.pointer.clear();
    }

    /// Append a node at the end.
    pub fn append(&self, node: Node) -> NodeId {
        let mut surface = self.lock();
        let id = NodeId(surface.next_id);
        surface.next_id = surface.next_id.wrapping_add(1);
        surface.nodes.push((id, node));
        id
    }

    /// Remove a node. Returns `false` if it was not present.
    pub fn remove(&self, id: NodeId) -> bool {
        let mut surface = self.lock();
        let before = surface.nodes.len();
        surface.nodes.retain(|(nid, _)| *nid != id);
        surface.nodes.len() != before
    }

    /// Replace a node's text. Returns `false` if the node is gone.
    pub fn set_text(&self, id: NodeId, text: impl Into<String>) -> bool {
        let mut surface = self.lock();
        match surface.nodes.iter_mut().find(|(nid, _)| *nid == id) {
            Some((_, node)) => {
                node.text = text.into();
                true
            },
            None => false,
        }
    }

    /// Snapshot of a single node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.lock()
            .nodes
            .iter()
            .find(|(nid, _)| *nid == id)
            .map(|(_, node)| node.clone())
    }

    /// Snapshot of every node in order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.lock().nodes.iter().map(|(_, n)| n.clone()).collect()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Whether the surface has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().nodes.is_empty()
    }

    /// Attach a pointer listener scoped to this surface.
    pub fn add_pointer_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(PointerEvent) + Send + Sync + 'static,
    {
        let mut surface = self.lock();
        let id = ListenerId::from_raw(surface.next_listener);
        surface.next_listener = surface.next_listener.wrapping_add(1);
        surface.pointer.push((id, Arc::new(listener)));
        id
    }

    /// Detach a pointer listener.
    pub fn remove_pointer_listener(&self, id: ListenerId) -> bool {
        let mut surface = self.lock();
        let before = surface.pointer.len();
        surface.pointer.retain(|(lid, _)| *lid != id);
        surface.pointer.len() != before
    }

    /// Deliver a pointer event to this surface's listeners.
    pub fn dispatch_pointer(&self, event: PointerEvent) -> usize {
        let listeners: Vec<PointerListener> =
            self.lock().pointer.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Number of pointer listeners.
    #[must_use]
    pub fn pointer_listener_count(&self) -> usize {
        self.lock().pointer.len()
    }
}
