//! Code units as dynamic libraries.
//!
//! The unit for `games/<slug>/module` is the platform library
//! `games/<slug>/module.{so,dylib,dll}`. It must export
//!
//! ```ignore
//! #[unsafe(no_mangle)]
//! pub extern "C" fn deepfly_module_init(registry: &ModuleRegistry, abi: u32) -> bool
//! ```
//!
//! which registers its descriptor and returns `false` if it does not speak
//! `abi`. The library must be built with the same toolchain and the same
//! `deepfly-hub` version as the host, since registry and descriptor types
//! cross the boundary by reference.
#![allow(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use libloading::{Library, Symbol};
use tracing::{debug, info};

use super::{FetchError, ModuleSource};
use crate::registry::ModuleRegistry;
use crate::slug::Slug;

/// Exported entry point name.
pub const INIT_SYMBOL: &[u8] = b"deepfly_module_init";

/// Version passed to every entry point.
pub const MODULE_ABI_VERSION: u32 = 1;

/// Signature of [`INIT_SYMBOL`].
pub type ModuleInitFn = unsafe extern "C" fn(registry: &ModuleRegistry, abi: u32) -> bool;

/// Loads code units with `libloading`.
///
/// Libraries stay loaded for the life of the source: descriptors registered
/// by a unit point into its code.
#[derive(Debug, Default)]
pub struct DylibSource {
    libraries: Mutex<Vec<Library>>,
}

impl DylibSource {
    /// A source with nothing loaded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform library path for a module path.
    #[must_use]
    pub fn library_path(module_path: &Path) -> PathBuf {
        module_path.with_extension(std::env::consts::DLL_EXTENSION)
    }

    /// Number of libraries kept alive.
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ModuleSource for DylibSource {
    async fn fetch_and_execute(
        &self,
        slug: &Slug,
        path: &Path,
        registry: &ModuleRegistry,
    ) -> Result<(), FetchError> {
        let file = Self::library_path(path);
        if !file.is_file() {
            return Err(FetchError::new(format!("{} not found", file.display())));
        }
        debug!(slug = %slug, path = %file.display(), "Loading module library");

        // SAFETY: loading runs the library's initialisers. Module libraries
        // are trusted host code built against this crate.
        let library = unsafe { Library::new(&file) }
            .map_err(|e| FetchError::new(format!("failed to load {}: {e}", file.display())))?;

        let accepted = {
            // SAFETY: the symbol is declared with `ModuleInitFn`'s signature by
            // the module contract above.
            let init: Symbol<'_, ModuleInitFn> = unsafe { library.get(INIT_SYMBOL) }.map_err(|e| {
                FetchError::new(format!(
                    "{} does not export deepfly_module_init: {e}",
                    file.display()
                ))
            })?;
            // SAFETY: `registry` outlives the call; the library stays loaded.
            unsafe { init(registry, MODULE_ABI_VERSION) }
        };

        if !accepted {
            return Err(FetchError::new(format!(
                "{} rejected module ABI version {MODULE_ABI_VERSION}",
                file.display()
            )));
        }

        info!(slug = %slug, path = %file.display(), "Module library loaded");
        self.libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(library);
        Ok(())
    }
}
