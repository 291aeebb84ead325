//! Event bus for broadcasting hub events to subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::event::HubEvent;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast bus shared by the hub and every module bus.
///
/// Clones share the same underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<HubEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event. Returns the number of receivers it reached.
    pub fn publish(&self, event: HubEvent) -> usize {
        let event = Arc::new(event);
        trace!(event_type = %event.event_type(), "Publishing event");

        if let Ok(count) = self.sender.send(Arc::clone(&event)) {
            debug!(
                event_type = %event.event_type(),
                receiver_count = count,
                "Event published"
            );
            count
        } else {
            trace!(event_type = %event.event_type(), "No receivers for event");
            0
        }
    }

    /// Subscribe to every event.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), ReceiverFilter::All)
    }

    /// Subscribe to one module's private messages, optionally narrowed by a
    /// topic pattern (exact, or a trailing `*` prefix match).
    #[must_use]
    pub(crate) fn subscribe_module(&self, slug: String, topic: Option<String>) -> EventReceiver {
        EventReceiver::new(
            self.sender.subscribe(),
            ReceiverFilter::Module { slug, topic },
        )
    }

    /// Number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
enum ReceiverFilter {
    All,
    Module { slug: String, topic: Option<String> },
}

impl ReceiverFilter {
    fn matches(&self, event: &HubEvent) -> bool {
        match self {
            Self::All => true,
            Self::Module { slug, topic } => {
                let HubEvent::Module {
                    slug: owner,
                    topic: event_topic,
                    ..
                } = event
                else {
                    return false;
                };
                if owner != slug {
                    return false;
                }
                match topic.as_deref() {
                    None => true,
                    Some(pattern) => match pattern.strip_suffix('*') {
                        Some(prefix) => event_topic.starts_with(prefix),
                        None => event_topic == pattern,
                    },
                }
            },
        }
    }
}

/// Receiving end of a bus subscription.
#[derive(Debug)]
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<HubEvent>>,
    filter: ReceiverFilter,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<Arc<HubEvent>>, filter: ReceiverFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event.
    ///
    /// Returns `None` once the channel is closed. Lagged events are skipped
    /// with a warning.
    pub async fn recv(&mut self) -> Option<Arc<HubEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<HubEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                },
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }

    /// Drain every queued matching event.
    pub fn drain(&mut self) -> Vec<Arc<HubEvent>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;

    fn notice(text: &str) -> HubEvent {
        HubEvent::Notice {
            metadata: EventMetadata::new("test"),
            message: text.to_string(),
            duration_ms: 100,
        }
    }

    fn module_msg(slug: &str, topic: &str) -> HubEvent {
        HubEvent::Module {
            metadata: EventMetadata::new(slug),
            slug: slug.to_string(),
            topic: topic.to_string(),
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert_eq!(bus.publish(notice("hi")), 1);
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "notice");
    }

    #[tokio::test]
    async fn no_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(notice("nobody")), 0);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::with_capacity(8);
        let clone = bus.clone();
        let mut receiver = bus.subscribe();
        clone.publish(notice("via clone"));
        assert!(receiver.try_recv().is_some());
        assert_eq!(clone.capacity(), 8);
    }

    #[tokio::test]
    async fn module_filter_only_sees_own_slug() {
        let bus = EventBus::new();
        let mut pong = bus.subscribe_module("pong".into(), None);

        bus.publish(notice("hub noise"));
        bus.publish(module_msg("runner", "score"));
        bus.publish(module_msg("pong", "score"));

        let got = pong.drain();
        assert_eq!(got.len(), 1);
        assert!(matches!(&*got[0], HubEvent::Module { slug, .. } if slug == "pong"));
    }

    #[tokio::test]
    async fn module_filter_topic_wildcard() {
        let bus = EventBus::new();
        let mut scores = bus.subscribe_module("pong".into(), Some("score.*".into()));
        let mut exact = bus.subscribe_module("pong".into(), Some("pause".into()));

        bus.publish(module_msg("pong", "score.p1"));
        bus.publish(module_msg("pong", "pause"));

        assert_eq!(scores.drain().len(), 1);
        assert_eq!(exact.drain().len(), 1);
    }
}
