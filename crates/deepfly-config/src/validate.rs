//! Post-merge validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{HubConfig, StoreBackend};

/// Highest accepted frame rate.
pub const MAX_FPS: u32 = 240;

/// Validate a merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &HubConfig) -> ConfigResult<()> {
    validate_store(config)?;
    validate_frames(config)?;
    validate_notices(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_store(config: &HubConfig) -> ConfigResult<()> {
    let store = &config.store;
    if store.namespace_prefix.is_empty() {
        return Err(invalid(
            "store.namespace_prefix",
            "namespace prefix must not be empty",
        ));
    }
    if store.backend == StoreBackend::File
        && store.path.as_ref().is_none_or(|p| p.as_os_str().is_empty())
    {
        return Err(invalid(
            "store.path",
            "the file backend requires a store path",
        ));
    }
    Ok(())
}

fn validate_frames(config: &HubConfig) -> ConfigResult<()> {
    let fps = config.frames.fps;
    if fps == 0 || fps > MAX_FPS {
        return Err(invalid(
            "frames.fps",
            format!("fps {fps} is out of range; must be between 1 and {MAX_FPS}"),
        ));
    }
    Ok(())
}

fn validate_notices(config: &HubConfig) -> ConfigResult<()> {
    if config.notices.duration_ms == 0 {
        return Err(invalid(
            "notices.duration_ms",
            "notice duration must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_logging(config: &HubConfig) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&HubConfig::default()).is_ok());
    }

    #[test]
    fn fps_bounds() {
        let mut config = HubConfig::default();
        config.frames.fps = 0;
        assert_eq!(field_of(validate(&config)), "frames.fps");
        config.frames.fps = MAX_FPS + 1;
        assert_eq!(field_of(validate(&config)), "frames.fps");
        config.frames.fps = MAX_FPS;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn file_backend_needs_path() {
        let mut config = HubConfig::default();
        config.store.backend = StoreBackend::File;
        assert_eq!(field_of(validate(&config)), "store.path");
        config.store.path = Some("/tmp/deepfly.json".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn empty_prefix_and_zero_notice_rejected() {
        let mut config = HubConfig::default();
        config.store.namespace_prefix.clear();
        assert_eq!(field_of(validate(&config)), "store.namespace_prefix");

        let mut config = HubConfig::default();
        config.notices.duration_ms = 0;
        assert_eq!(field_of(validate(&config)), "notices.duration_ms");
    }

    #[test]
    fn unknown_log_format_rejected() {
        let mut config = HubConfig::default();
        config.logging.format = "xml".into();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }
}
