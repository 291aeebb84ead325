//! Module registry.
//!
//! Maps slugs to descriptors. Entries are added by modules themselves as the
//! side effect of their code unit running, and are never replaced or removed.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{info, warn};

use crate::manifest::ModuleManifest;
use crate::module::ModuleDescriptor;
use crate::slug::Slug;

/// Slug → descriptor map, first registration wins.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<Slug, Arc<ModuleDescriptor>>>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("slugs", &self.slugs())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<ModuleRegistry>> = OnceLock::new();

impl ModuleRegistry {
    /// Create an isolated, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry that code units register into by default.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Register `descriptor` under `slug`.
    ///
    /// A slug already present is left untouched and `false` is returned.
    /// Note this means a second, corrected build of a module is silently
    /// ignored until the process restarts.
    pub fn register(&self, slug: Slug, descriptor: ModuleDescriptor) -> bool {
        if descriptor.slug() != &slug {
            warn!(
                slug = %slug,
                manifest_slug = %descriptor.slug(),
                "Registering descriptor whose manifest names a different slug"
            );
        }

        let mut modules = self
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if modules.contains_key(&slug) {
            warn!(slug = %slug, "Module already registered, ignoring duplicate");
            return false;
        }
        info!(slug = %slug, name = %descriptor.manifest().name, "Registered module");
        modules.insert(slug, Arc::new(descriptor));
        true
    }

    /// Look up a descriptor.
    #[must_use]
    pub fn get(&self, slug: &str) -> Option<Arc<ModuleDescriptor>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slug)
            .cloned()
    }

    /// Whether `slug` is registered.
    #[must_use]
    pub fn contains(&self, slug: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(slug)
    }

    /// Registered slugs, sorted.
    #[must_use]
    pub fn slugs(&self) -> Vec<Slug> {
        let mut slugs: Vec<Slug> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        slugs.sort();
        slugs
    }

    /// Manifests of every registered module, sorted by slug.
    #[must_use]
    pub fn manifests(&self) -> Vec<ModuleManifest> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        let mut manifests: Vec<ModuleManifest> =
            modules.values().map(|d| d.manifest().clone()).collect();
        manifests.sort_by(|a, b| a.slug.cmp(&b.slug));
        manifests
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(slug: &str, name: &str) -> ModuleDescriptor {
        ModuleDescriptor::manifest_only(ModuleManifest::new(Slug::new(slug).unwrap(), name))
    }

    #[test]
    fn first_registration_wins() {
        let registry = ModuleRegistry::new();
        let slug = Slug::new("pong").unwrap();

        assert!(registry.register(slug.clone(), descriptor("pong", "first")));
        assert!(!registry.register(slug, descriptor("pong", "second")));

        assert_eq!(registry.get("pong").unwrap().manifest().name, "first");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookups_and_listing() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        registry.register(Slug::new("runner").unwrap(), descriptor("runner", "Runner"));
        registry.register(Slug::new("pong").unwrap(), descriptor("pong", "Pong"));

        assert!(registry.contains("pong"));
        assert!(!registry.contains("snake"));
        assert!(registry.get("snake").is_none());
        let slugs: Vec<String> = registry.slugs().iter().map(ToString::to_string).collect();
        assert_eq!(slugs, vec!["pong", "runner"]);
        assert_eq!(registry.manifests()[1].name, "Runner");
    }

    #[test]
    fn global_is_a_singleton() {
        assert!(Arc::ptr_eq(&ModuleRegistry::global(), &ModuleRegistry::global()));
    }

    #[test]
    fn isolated_instances_do_not_share() {
        let a = ModuleRegistry::new();
        let b = ModuleRegistry::new();
        a.register(Slug::new("pong").unwrap(), descriptor("pong", "Pong"));
        assert!(b.is_empty());
    }
}
