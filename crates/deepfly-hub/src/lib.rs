#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! DeepFly hub runtime: loads game modules by slug and keeps exactly one of
//! them mounted.
//!
//! The pieces, leaves first:
//!
//! - [`ModuleRegistry`]: slug → descriptor, filled by modules registering
//!   themselves when their code unit runs.
//! - [`Loader`]: fetches a code unit through a [`ModuleSource`] at most once
//!   per slug and checks that it registered.
//! - [`Lifecycle`]: owns the single active-instance slot, mounts modules
//!   with fresh [`Capabilities`] and tears them down deterministically.
//! - [`Router`]: maps the navigation token (`#game=<slug>`) to lifecycle
//!   transitions and writes confirmed transitions back.
//! - [`Hub`]: all of the above wired from a [`deepfly_config::HubConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deepfly_config::HubConfig;
//! use deepfly_hub::{BundledSource, Hub};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Hub::from_config(&HubConfig::default(), Arc::new(BundledSource::new()))?;
//! hub.start();
//! hub.open("pong").await?;
//! assert_eq!(hub.token(), "#game=pong");
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod container;
pub mod error;
pub mod frames;
pub mod hub;
pub mod keyboard;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod module;
pub mod registry;
pub mod router;
pub mod slug;
pub mod source;

pub use capabilities::{Capabilities, CapabilityFactory, DEFAULT_NAMESPACE_PREFIX};
pub use container::{Container, Node, NodeId, PointerEvent};
pub use error::{HubError, HubResult, LoadFailure, ModuleError};
pub use frames::{FrameClock, FrameHandle, FrameInfo};
pub use hub::{Hub, source_for};
pub use keyboard::{KeyEvent, KeyPhase, Keyboard, ListenerId};
pub use lifecycle::{
    CloseOutcome, DEFAULT_NOTICE_DURATION, Lifecycle, LifecycleState, OpenOutcome,
};
pub use loader::Loader;
pub use manifest::ModuleManifest;
pub use module::{GameModule, ModuleDescriptor, MountHandle};
pub use registry::ModuleRegistry;
pub use router::{
    EMPTY_TOKEN, Location, MemoryLocation, NavigationEvent, RouteOutcome, Router, parse_slug,
    token_for,
};
pub use slug::Slug;
pub use source::{BundledSource, CodeUnit, FetchError, ModuleSource};
#[cfg(feature = "dylib")]
pub use source::{DylibSource, INIT_SYMBOL, MODULE_ABI_VERSION, ModuleInitFn};
