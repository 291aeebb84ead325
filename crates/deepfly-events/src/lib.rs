//! DeepFly Events - the hub's broadcast event bus.
//!
//! The hub publishes lifecycle events ([`HubEvent::ModuleMounted`],
//! [`HubEvent::OpenFailed`], [`HubEvent::Notice`], ...) that the host UI
//! listens to, and each mounted module gets a [`ModuleBus`]: a private
//! channel that only carries messages tagged with that module's slug.
//!
//! # Example
//!
//! ```rust
//! use deepfly_events::{EventBus, HubEvent, EventMetadata};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(HubEvent::Notice {
//!     metadata: EventMetadata::new("hub"),
//!     message: "INSERT COIN".to_string(),
//!     duration_ms: 900,
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "notice");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod bus;
mod event;
mod module_bus;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventMetadata, HubEvent};
pub use module_bus::ModuleBus;
