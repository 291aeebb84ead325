//! Module identifiers.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// A module's unique key, such as `"pong"`.
///
/// Slugs match `[\w-]+` in ASCII: letters, digits, `_` and `-`. Anything
/// else could escape the `games/<slug>/module` path template and is rejected
/// before any fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Slug(String);

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl Slug {
    /// Validate and wrap a slug.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidSlug`] if the input is empty or contains a
    /// character outside `[A-Za-z0-9_-]`.
    pub fn new(slug: impl Into<String>) -> HubResult<Self> {
        let slug = slug.into();
        Self::validate(&slug)?;
        Ok(Self(slug))
    }

    /// The slug text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `slug` would be accepted by [`Slug::new`].
    #[must_use]
    pub fn is_valid(slug: &str) -> bool {
        Self::validate(slug).is_ok()
    }

    /// Location of this module's code unit under `root`.
    #[must_use]
    pub fn module_path(&self, root: &Path) -> PathBuf {
        root.join("games").join(&self.0).join("module")
    }

    fn validate(slug: &str) -> HubResult<()> {
        if slug.is_empty() {
            return Err(HubError::InvalidSlug {
                slug: String::new(),
                reason: "slug must not be empty".into(),
            });
        }
        if let Some(bad) = slug
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(HubError::InvalidSlug {
                slug: slug.to_owned(),
                reason: format!(
                    "character {bad:?} is not allowed; use ASCII letters, digits, '_' or '-'"
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Slug {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for Slug {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_word_characters_and_hyphens() {
        for ok in ["pong", "runner", "space_invaders", "tic-tac-toe", "Game2"] {
            assert!(Slug::is_valid(ok), "{ok} should be valid");
        }
    }

    #[test]
    fn rejects_path_escapes_and_empty() {
        for bad in ["", "../etc", "a/b", "a.b", "pong?x=1", "игра", "a b"] {
            assert!(
                matches!(Slug::new(bad), Err(HubError::InvalidSlug { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn module_path_follows_template() {
        let slug = Slug::new("pong").unwrap();
        assert_eq!(
            slug.module_path(Path::new("/srv/arcade")),
            PathBuf::from("/srv/arcade/games/pong/module")
        );
    }

    #[test]
    fn deserialize_validates() {
        let ok: Slug = serde_json::from_str("\"runner\"").unwrap();
        assert_eq!(ok.as_str(), "runner");
        assert!(serde_json::from_str::<Slug>("\"../x\"").is_err());
    }
}
