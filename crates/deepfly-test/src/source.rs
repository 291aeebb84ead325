//! A module source driven by a per-slug script.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use deepfly_hub::{
    FetchError, GameModule, ModuleDescriptor, ModuleManifest, ModuleRegistry, ModuleSource, Slug,
};

/// What running a slug's code unit does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Register this descriptor.
    Register(ModuleDescriptor),
    /// Run without registering anything.
    SkipRegistration,
    /// Fail the fetch with this message.
    Fail(String),
}

/// Module source for tests: scripted outcomes, optional latency, and a fetch
/// counter per slug. Slugs without a script fail like a missing file.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    scripts: HashMap<String, Script>,
    delay: Option<Duration>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl ScriptedSource {
    /// A source with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` under `slug` when fetched.
    ///
    /// # Panics
    ///
    /// If `slug` is not a valid slug.
    #[must_use]
    pub fn with_module(self, slug: &str, module: impl GameModule + 'static) -> Self {
        let manifest = ModuleManifest::new(
            Slug::new(slug).unwrap_or_else(|e| panic!("bad test slug: {e}")),
            slug,
        );
        self.with_descriptor(slug, ModuleDescriptor::new(manifest, module))
    }

    /// Register `descriptor` under `slug` when fetched.
    #[must_use]
    pub fn with_descriptor(mut self, slug: &str, descriptor: ModuleDescriptor) -> Self {
        self.scripts
            .insert(slug.to_owned(), Script::Register(descriptor));
        self
    }

    /// Fetching `slug` succeeds but registers nothing.
    #[must_use]
    pub fn with_skip(mut self, slug: &str) -> Self {
        self.scripts
            .insert(slug.to_owned(), Script::SkipRegistration);
        self
    }

    /// Fetching `slug` fails with `message`.
    #[must_use]
    pub fn with_failure(mut self, slug: &str, message: impl Into<String>) -> Self {
        self.scripts
            .insert(slug.to_owned(), Script::Fail(message.into()));
        self
    }

    /// Every fetch takes this long.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fetches started for `slug`.
    #[must_use]
    pub fn fetch_count(&self, slug: &str) -> usize {
        self.fetches
            .lock()
            .map(|f| f.get(slug).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Fetches started for any slug.
    #[must_use]
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().map(|f| f.values().sum()).unwrap_or(0)
    }
}

#[async_trait]
impl ModuleSource for ScriptedSource {
    async fn fetch_and_execute(
        &self,
        slug: &Slug,
        path: &Path,
        registry: &ModuleRegistry,
    ) -> Result<(), FetchError> {
        if let Ok(mut fetches) = self.fetches.lock() {
            let count = fetches.entry(slug.to_string()).or_insert(0);
            *count = count.saturating_add(1);
        }
        tracing::debug!(slug = %slug, path = %path.display(), "scripted fetch");

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.scripts.get(slug.as_str()) {
            Some(Script::Register(descriptor)) => {
                registry.register(slug.clone(), descriptor.clone());
                Ok(())
            },
            Some(Script::SkipRegistration) => Ok(()),
            Some(Script::Fail(message)) => Err(FetchError::new(message.clone())),
            None => Err(FetchError::new(format!(
                "no code unit at {}",
                path.display()
            ))),
        }
    }
}
