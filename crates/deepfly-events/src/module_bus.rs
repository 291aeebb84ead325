//! Per-module private event channel.

use serde_json::Value;

use crate::bus::{EventBus, EventReceiver};
use crate::event::{EventMetadata, HubEvent};

/// The `bus` capability handed to a mounted module.
///
/// Messages are tagged with the owning slug on the way out, and receivers
/// created here only yield messages carrying that same slug.
#[derive(Debug, Clone)]
pub struct ModuleBus {
    bus: EventBus,
    slug: String,
}

impl ModuleBus {
    /// Bind a private channel for `slug` on top of the shared bus.
    #[must_use]
    pub fn new(bus: EventBus, slug: impl Into<String>) -> Self {
        Self {
            bus,
            slug: slug.into(),
        }
    }

    /// Slug this channel belongs to.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Emit a message on this module's channel.
    pub fn emit(&self, topic: impl Into<String>, payload: Value) -> usize {
        self.bus.publish(HubEvent::Module {
            metadata: EventMetadata::new(self.slug.clone()),
            slug: self.slug.clone(),
            topic: topic.into(),
            payload,
        })
    }

    /// Receive every message on this module's channel.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe_module(self.slug.clone(), None)
    }

    /// Receive messages whose topic matches `pattern` (exact, or trailing `*`).
    #[must_use]
    pub fn subscribe_topic(&self, pattern: impl Into<String>) -> EventReceiver {
        self.bus
            .subscribe_module(self.slug.clone(), Some(pattern.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channels_are_private_per_slug() {
        let bus = EventBus::new();
        let pong = ModuleBus::new(bus.clone(), "pong");
        let runner = ModuleBus::new(bus.clone(), "runner");
        let mut pong_rx = pong.subscribe();
        let mut runner_rx = runner.subscribe();

        pong.emit("score", serde_json::json!({"p1": 3, "p2": 1}));

        assert!(runner_rx.try_recv().is_none());
        let event = pong_rx.recv().await.unwrap();
        match &*event {
            HubEvent::Module { topic, payload, .. } => {
                assert_eq!(topic, "score");
                assert_eq!(payload["p1"], 3);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn hub_subscribers_still_observe_module_traffic() {
        let bus = EventBus::new();
        let mut all = bus.subscribe();
        ModuleBus::new(bus.clone(), "runner").emit("jump", Value::Null);
        assert_eq!(all.try_recv().unwrap().event_type(), "module");
    }
}
