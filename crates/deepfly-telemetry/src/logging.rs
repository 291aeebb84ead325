//! Logging configuration and setup.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Prefix of the daily log files (`deepfly.2026-10-16`).
pub const LOG_FILE_PREFIX: &str = "deepfly";

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line output.
    #[default]
    Compact,
    /// Structured JSON lines.
    Json,
    /// Default `fmt` output with all fields.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard error, with colors.
    #[default]
    Stderr,
    /// Daily files under this directory, without colors.
    Directory(PathBuf),
    /// The test harness capture (`fmt::TestWriter`).
    Test,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level filter (`info`, `debug`, ...).
    pub level: String,
    /// Line layout.
    #[serde(default)]
    pub format: LogFormat,
    /// Output target.
    #[serde(default)]
    pub target: LogTarget,
    /// Include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Extra `EnvFilter` directives (e.g. `deepfly_hub=debug`).
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Stderr, compact, with timestamps, at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            timestamps: true,
            directives: Vec::new(),
        }
    }

    /// Build from the `[logging]` section of the hub configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ConfigError`] for an unknown format name.
    pub fn from_settings(settings: &deepfly_config::LoggingConfig) -> TelemetryResult<Self> {
        Ok(Self {
            level: settings.level.clone(),
            format: settings.format.parse()?,
            target: settings
                .directory
                .clone()
                .map_or(LogTarget::Stderr, LogTarget::Directory),
            timestamps: true,
            directives: settings.directives.clone(),
        })
    }

    /// Set the format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Disable timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;
        for directive in &self.directives {
            let directive = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(format!("directive '{directive}': {e}"))
                })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Install a global subscriber for `config`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the log directory
/// cannot be created, or a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;
    match &config.target {
        LogTarget::Stderr => install(filter, config, std::io::stderr, true),
        LogTarget::Test => install(filter, config, fmt::TestWriter::new, false),
        LogTarget::Directory(dir) => {
            std::fs::create_dir_all(dir)?;
            install(filter, config, rolling::daily(dir, LOG_FILE_PREFIX), false)
        },
    }
}

macro_rules! try_init {
    ($filter:expr, $layer:expr, $timestamps:expr) => {
        if $timestamps {
            tracing_subscriber::registry()
                .with($filter)
                .with($layer)
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with($filter)
                .with($layer.without_time())
                .try_init()
        }
    };
}

fn install<W>(filter: EnvFilter, config: &LogConfig, writer: W, ansi: bool) -> TelemetryResult<()>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    let installed = match config.format {
        LogFormat::Json => try_init!(filter, layer.json(), config.timestamps),
        LogFormat::Pretty => try_init!(filter, layer.pretty(), config.timestamps),
        LogFormat::Compact => try_init!(filter, layer.compact(), config.timestamps),
        LogFormat::Full => try_init!(filter, layer, config.timestamps),
    };
    installed.map_err(|e| TelemetryError::InitError(e.to_string()))
}
