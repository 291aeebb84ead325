#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Layered configuration for the DeepFly hub.
//!
//! # Usage
//!
//! ```rust,no_run
//! use deepfly_config::HubConfig;
//!
//! let resolved = HubConfig::load(Some(std::path::Path::new("."))).unwrap();
//! println!("frames at {} fps", resolved.config.frames.fps);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Site** (`{root}/.deepfly/config.toml`)
//! 2. **User** (`~/.deepfly/config.toml`)
//! 3. **Environment** (`DEEPFLY_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml`)

/// Environment variable fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered TOML merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use merge::ConfigLayer;
pub use types::*;

impl HubConfig {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any file is malformed or the result fails
    /// validation.
    pub fn load(site_root: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(site_root, None)
    }

    /// Load with an explicit user config directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any file is malformed or the result fails
    /// validation.
    pub fn load_with_home(
        site_root: Option<&std::path::Path>,
        home_dir: &std::path::Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(site_root, Some(home_dir))
    }
}
