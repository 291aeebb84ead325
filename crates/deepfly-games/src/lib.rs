#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Game modules bundled with the DeepFly hub.
//!
//! Each game is a code unit: running it registers the game's descriptor.
//! [`catalog`] exposes them to the hub loader as a
//! [`BundledSource`](deepfly_hub::BundledSource).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deepfly_config::HubConfig;
//! use deepfly_hub::Hub;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Hub::from_config(&HubConfig::default(), Arc::new(deepfly_games::catalog()))?;
//! hub.start();
//! hub.open("runner").await?;
//! # Ok(())
//! # }
//! ```

mod frame_loop;
pub mod pong;
pub mod runner;

use deepfly_hub::{BundledSource, ModuleRegistry};

/// Every bundled game as a code unit keyed by slug.
#[must_use]
pub fn catalog() -> BundledSource {
    BundledSource::new()
        .with_unit(pong::SLUG, pong::register)
        .with_unit(runner::SLUG, runner::register)
}

/// Register every bundled game directly, skipping the loader.
pub fn register_all(registry: &ModuleRegistry) {
    pong::register(registry);
    runner::register(registry);
}
