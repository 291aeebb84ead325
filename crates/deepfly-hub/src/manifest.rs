//! Module display metadata.

use serde::{Deserialize, Serialize};

use crate::slug::Slug;

/// Display metadata a module registers alongside its entry point.
///
/// The hub never interprets these fields; they are passed through to the
/// host UI (menu tiles, titles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique key.
    pub slug: Slug,
    /// Human-readable title.
    pub name: String,
    /// One-line tagline shown under the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Short glyph or emoji for the menu tile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Module version string.
    #[serde(default = "default_version")]
    pub version: String,
    /// Number of players.
    #[serde(default = "default_players")]
    pub players: u8,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_players() -> u8 {
    1
}

impl ModuleManifest {
    /// A minimal manifest: single player, version `0.0.0`.
    #[must_use]
    pub fn new(slug: Slug, name: impl Into<String>) -> Self {
        Self {
            slug,
            name: name.into(),
            caption: None,
            icon: None,
            version: default_version(),
            players: default_players(),
        }
    }

    /// Set the caption.
    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Set the icon.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the player count.
    #[must_use]
    pub fn with_players(mut self, players: u8) -> Self {
        self.players = players;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults_and_optional_fields() {
        let manifest: ModuleManifest =
            serde_json::from_str(r#"{"slug":"pong","name":"Pong","players":2}"#).unwrap();
        assert_eq!(manifest.players, 2);
        assert_eq!(manifest.version, "0.0.0");
        assert!(manifest.caption.is_none());

        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json.get("caption").is_none());
    }

    #[test]
    fn builder() {
        let manifest = ModuleManifest::new(Slug::new("runner").unwrap(), "Runner")
            .with_caption("Jump and run")
            .with_icon("R")
            .with_version("1.0.0");
        assert_eq!(manifest.caption.as_deref(), Some("Jump and run"));
        assert_eq!(manifest.players, 1);
    }
}
