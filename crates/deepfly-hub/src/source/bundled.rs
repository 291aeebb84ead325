use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{FetchError, ModuleSource};
use crate::registry::ModuleRegistry;
use crate::slug::Slug;

/// A statically linked code unit: runs its registration side effect.
pub type CodeUnit = Arc<dyn Fn(&ModuleRegistry) + Send + Sync>;

/// Code units compiled into the host, keyed by slug.
#[derive(Clone, Default)]
pub struct BundledSource {
    catalog: HashMap<String, CodeUnit>,
}

impl std::fmt::Debug for BundledSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut slugs: Vec<&String> = self.catalog.keys().collect();
        slugs.sort();
        f.debug_struct("BundledSource")
            .field("units", &slugs)
            .finish()
    }
}

impl BundledSource {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, builder style.
    #[must_use]
    pub fn with_unit<F>(mut self, slug: impl Into<String>, unit: F) -> Self
    where
        F: Fn(&ModuleRegistry) + Send + Sync + 'static,
    {
        self.insert(slug, unit);
        self
    }

    /// Add or replace a unit.
    pub fn insert<F>(&mut self, slug: impl Into<String>, unit: F)
    where
        F: Fn(&ModuleRegistry) + Send + Sync + 'static,
    {
        self.catalog.insert(slug.into(), Arc::new(unit));
    }

    /// Slugs with a bundled unit, sorted.
    #[must_use]
    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.catalog.keys().cloned().collect();
        slugs.sort();
        slugs
    }
}

#[async_trait]
impl ModuleSource for BundledSource {
    async fn fetch_and_execute(
        &self,
        slug: &Slug,
        path: &Path,
        registry: &ModuleRegistry,
    ) -> Result<(), FetchError> {
        let unit = self
            .catalog
            .get(slug.as_str())
            .ok_or_else(|| FetchError::new(format!("no code unit at {}", path.display())))?;
        debug!(slug = %slug, path = %path.display(), "Executing bundled code unit");
        unit(registry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ModuleManifest;
    use crate::module::ModuleDescriptor;

    fn register_pong(registry: &ModuleRegistry) {
        let slug = Slug::new("pong").unwrap();
        registry.register(
            slug.clone(),
            ModuleDescriptor::manifest_only(ModuleManifest::new(slug, "Pong")),
        );
    }

    #[tokio::test]
    async fn executes_catalog_entry() {
        let source = BundledSource::new().with_unit("pong", register_pong);
        let registry = ModuleRegistry::new();
        let slug = Slug::new("pong").unwrap();

        source
            .fetch_and_execute(&slug, Path::new("games/pong/module"), &registry)
            .await
            .unwrap();
        assert!(registry.contains("pong"));
    }

    #[tokio::test]
    async fn unknown_slug_is_a_fetch_error() {
        let source = BundledSource::new();
        let err = source
            .fetch_and_execute(
                &Slug::new("missing").unwrap(),
                Path::new("games/missing/module"),
                &ModuleRegistry::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("games/missing/module"));
    }
}
