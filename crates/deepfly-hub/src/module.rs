//! The module contract and the descriptor a module registers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capabilities::Capabilities;
use crate::container::Container;
use crate::error::ModuleError;
use crate::manifest::ModuleManifest;
use crate::slug::Slug;

/// A minigame the hub can mount.
///
/// `mount` takes temporary exclusive ownership of `container`: it clears any
/// prior content, draws into it, and may attach listeners to the container
/// and to `caps.keyboard`. The returned handle must undo all of it.
#[async_trait]
pub trait GameModule: Send + Sync {
    /// Start an instance.
    ///
    /// # Errors
    ///
    /// Returns a [`ModuleError`] if the instance cannot start. The hub
    /// clears the container and returns to idle.
    async fn mount(
        &self,
        container: Container,
        caps: Capabilities,
    ) -> Result<Box<dyn MountHandle>, ModuleError>;
}

/// A live module instance.
pub trait MountHandle: Send {
    /// Stop the instance: cancel its frame callback, remove every keyboard
    /// listener, detach from the container.
    ///
    /// Consumes the handle, so it runs at most once. The hub logs any error
    /// and continues the transition.
    ///
    /// # Errors
    ///
    /// Returns a [`ModuleError`] if cleanup was incomplete.
    fn unmount(self: Box<Self>) -> Result<(), ModuleError>;
}

/// A registered module: manifest plus entry point.
///
/// Created once when the module's code unit runs; never mutated afterwards.
#[derive(Clone)]
pub struct ModuleDescriptor {
    manifest: ModuleManifest,
    entry: Option<Arc<dyn GameModule>>,
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("manifest", &self.manifest)
            .field("has_entry_point", &self.entry.is_some())
            .finish()
    }
}

impl ModuleDescriptor {
    /// Descriptor with an entry point.
    #[must_use]
    pub fn new(manifest: ModuleManifest, module: impl GameModule + 'static) -> Self {
        Self::from_arc(manifest, Arc::new(module))
    }

    /// Descriptor sharing an existing entry point.
    #[must_use]
    pub fn from_arc(manifest: ModuleManifest, module: Arc<dyn GameModule>) -> Self {
        Self {
            manifest,
            entry: Some(module),
        }
    }

    /// Descriptor with no entry point. Loading succeeds; mounting fails.
    #[must_use]
    pub fn manifest_only(manifest: ModuleManifest) -> Self {
        Self {
            manifest,
            entry: None,
        }
    }

    /// The module's slug, from its manifest.
    #[must_use]
    pub fn slug(&self) -> &Slug {
        &self.manifest.slug
    }

    /// Display metadata.
    #[must_use]
    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    /// The mount entry point, if any.
    #[must_use]
    pub fn entry_point(&self) -> Option<&Arc<dyn GameModule>> {
        self.entry.as_ref()
    }
}
