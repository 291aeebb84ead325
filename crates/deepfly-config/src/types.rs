//! Configuration types for the hub.
//!
//! Every struct implements [`Default`] matching `defaults.toml`, so a bare
//! `[section]` header in a user file still produces a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Where module code units come from and how fetches behave.
    pub modules: ModulesConfig,
    /// Persistent key/value store backing module capabilities.
    pub store: StoreConfig,
    /// Frame clock settings.
    pub frames: FramesConfig,
    /// Transient user-visible notices.
    pub notices: NoticesConfig,
    /// Logging level and output format.
    pub logging: LoggingConfig,
}

/// How module code units are located and executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleSourceKind {
    /// Code units compiled into the host binary.
    #[default]
    Bundled,
    /// Dynamic libraries under `{root}/games/<slug>/`.
    Dylib,
}

/// `[modules]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Directory containing `games/<slug>/module`.
    pub root: PathBuf,
    /// Source used to fetch and execute code units.
    pub source: ModuleSourceKind,
    /// Forget a failed fetch so the next `open` tries again.
    pub retry_failed_fetches: bool,
    /// Upper bound on a single fetch, in milliseconds. `0` disables it.
    pub fetch_timeout_ms: u64,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            source: ModuleSourceKind::Bundled,
            retry_failed_fetches: false,
            fetch_timeout_ms: 0,
        }
    }
}

impl ModulesConfig {
    /// The fetch timeout, if one is configured.
    #[must_use]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-lifetime memory store.
    #[default]
    Memory,
    /// JSON file at `store.path`.
    File,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind.
    pub backend: StoreBackend,
    /// File path for the `file` backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Prefix prepended to every module namespace (`deepfly.` gives
    /// `deepfly.game.<slug>`).
    pub namespace_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            namespace_prefix: "deepfly.".to_owned(),
        }
    }
}

impl StoreConfig {
    /// Namespace handed to the module with the given slug.
    #[must_use]
    pub fn namespace_for(&self, slug: &str) -> String {
        format!("{}game.{slug}", self.namespace_prefix)
    }
}

/// `[frames]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// Ticks per second when the host drives the frame clock.
    pub fps: u32,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self { fps: 60 }
    }
}

/// `[notices]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticesConfig {
    /// How long a failure toast stays visible.
    pub duration_ms: u64,
}

impl Default for NoticesConfig {
    fn default() -> Self {
        Self { duration_ms: 2200 }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`, `full`).
    pub format: String,
    /// Extra `EnvFilter` directives such as `deepfly_hub=debug`.
    pub directives: Vec<String>,
    /// Write daily log files here instead of stderr.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_uses_prefix() {
        let store = StoreConfig::default();
        assert_eq!(store.namespace_for("runner"), "deepfly.game.runner");
    }

    #[test]
    fn zero_timeout_means_none() {
        let mut modules = ModulesConfig::default();
        assert_eq!(modules.fetch_timeout(), None);
        modules.fetch_timeout_ms = 1500;
        assert_eq!(modules.fetch_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn bare_sections_fill_defaults() {
        let config: HubConfig = toml::from_str("[modules]\n[store]\n").unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn log_directory_is_optional() {
        let config: HubConfig =
            toml::from_str("[logging]\ndirectory = \"/var/log/deepfly\"\n").unwrap();
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/var/log/deepfly"))
        );
        assert_eq!(config.logging.level, "info");
    }
}
