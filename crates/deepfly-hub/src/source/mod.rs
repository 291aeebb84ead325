//! Where module code units come from.
//!
//! A [`ModuleSource`] fetches the code unit for a slug and executes it. The
//! loader treats the unit as a black box: the only effect it observes is
//! whether the slug shows up in the registry afterwards.

use std::path::Path;

use async_trait::async_trait;

use crate::registry::ModuleRegistry;
use crate::slug::Slug;

mod bundled;
#[cfg(feature = "dylib")]
mod dylib;

pub use bundled::{BundledSource, CodeUnit};
#[cfg(feature = "dylib")]
pub use dylib::{DylibSource, INIT_SYMBOL, MODULE_ABI_VERSION, ModuleInitFn};

/// The code unit could not be fetched or executed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FetchError(pub String);

impl FetchError {
    /// Wrap a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Fetches and executes module code units.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Fetch the unit for `slug` from `path` and run it against `registry`.
    ///
    /// Succeeding says nothing about registration; the loader checks that
    /// separately.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the unit is missing or fails to execute.
    async fn fetch_and_execute(
        &self,
        slug: &Slug,
        path: &Path,
        registry: &ModuleRegistry,
    ) -> Result<(), FetchError>;
}
