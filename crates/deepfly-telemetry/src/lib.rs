//! Logging setup for the DeepFly hub.
//!
//! # Example
//!
//! ```rust,no_run
//! use deepfly_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), deepfly_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("deepfly_hub=trace");
//!
//! setup_logging(&config)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LOG_FILE_PREFIX, LogConfig, LogFormat, LogTarget, setup_logging};
