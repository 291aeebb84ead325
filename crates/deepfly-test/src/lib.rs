//! DeepFly Test - shared test utilities for the hub crates.
//!
//! Mock modules that record every mount and unmount, a scripted module
//! source that counts fetches, and a once-only tracing setup.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! deepfly-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use deepfly_test::{MockModule, ScriptedSource, Tally};
//!
//! #[tokio::test]
//! async fn opens_pong() {
//!     let tally = Tally::new();
//!     let source = ScriptedSource::new().with_module("pong", MockModule::new("pong", &tally));
//!     let hub = deepfly_test::test_hub(source);
//!
//!     hub.open("pong").await.unwrap();
//!     assert_eq!(tally.mounts(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;
pub mod source;
pub mod tracing_init;

pub use fixtures::*;
pub use mocks::*;
pub use source::*;
pub use tracing_init::init_test_tracing;
