//! Module loader.
//!
//! Ensures a slug's descriptor is in the registry, fetching its code unit on
//! first use. Each slug is fetched at most once per loader: concurrent
//! callers join the in-flight attempt, and the attempt's outcome (success or
//! failure) is memoized. Failed attempts can optionally be forgotten so the
//! next call fetches again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use deepfly_events::{EventBus, EventMetadata, HubEvent};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info, warn};

use crate::error::{HubError, HubResult, LoadFailure};
use crate::manifest::ModuleManifest;
use crate::module::ModuleDescriptor;
use crate::registry::ModuleRegistry;
use crate::slug::Slug;
use crate::source::{FetchError, ModuleSource};

type Attempt = Shared<BoxFuture<'static, HubResult<ModuleManifest>>>;

/// Fetches code units and waits for them to register.
pub struct Loader {
    registry: Arc<ModuleRegistry>,
    source: Arc<dyn ModuleSource>,
    root: PathBuf,
    attempts: Mutex<HashMap<Slug, Attempt>>,
    retry_failed: bool,
    fetch_timeout: Option<Duration>,
    bus: Option<EventBus>,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("root", &self.root)
            .field("attempts", &self.attempt_count())
            .field("retry_failed", &self.retry_failed)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl Loader {
    /// A loader fetching from `source`, resolving code unit paths under
    /// `root`, and registering into `registry`.
    #[must_use]
    pub fn new(
        registry: Arc<ModuleRegistry>,
        source: Arc<dyn ModuleSource>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            source,
            root: root.into(),
            attempts: Mutex::new(HashMap::new()),
            retry_failed: false,
            fetch_timeout: None,
            bus: None,
        }
    }

    /// Forget failed attempts so a later call fetches again.
    #[must_use]
    pub fn with_retry_failed(mut self, retry: bool) -> Self {
        self.retry_failed = retry;
        self
    }

    /// Bound each fetch; a timeout counts as a network failure.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Publish [`HubEvent::ModuleLoaded`] on `bus` after each successful fetch.
    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The registry this loader fills.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Root directory for `games/<slug>/module`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make `slug` available and return its manifest.
    ///
    /// # Errors
    ///
    /// - [`HubError::InvalidSlug`] before any fetch if `slug` is malformed.
    /// - [`HubError::ModuleLoad`] with [`LoadFailure::Network`] if the fetch
    ///   failed, or [`LoadFailure::NotRegistered`] if the unit ran without
    ///   registering.
    pub async fn load(&self, slug: &str) -> HubResult<ModuleManifest> {
        let slug = Slug::new(slug)?;
        self.load_slug(&slug).await
    }

    /// [`Loader::load`] for an already-validated slug.
    ///
    /// # Errors
    ///
    /// See [`Loader::load`].
    pub async fn load_slug(&self, slug: &Slug) -> HubResult<ModuleManifest> {
        if let Some(descriptor) = self.registry.get(slug.as_str()) {
            return Ok(descriptor.manifest().clone());
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = attempts.get(slug) {
                debug!(slug = %slug, "Joining existing load attempt");
                existing.clone()
            } else {
                let attempt = self.start_attempt(slug);
                attempts.insert(slug.clone(), attempt.clone());
                attempt
            }
        };

        let result = attempt.clone().await;
        if result.is_err() && self.retry_failed {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            if attempts.get(slug).is_some_and(|a| a.ptr_eq(&attempt)) {
                debug!(slug = %slug, "Forgetting failed load attempt");
                attempts.remove(slug);
            }
        }
        result
    }

    /// Load `slug` and return its full descriptor.
    ///
    /// # Errors
    ///
    /// See [`Loader::load`].
    pub async fn resolve(&self, slug: &Slug) -> HubResult<Arc<ModuleDescriptor>> {
        self.load_slug(slug).await?;
        self.registry
            .get(slug.as_str())
            .ok_or_else(|| HubError::load(slug.as_str(), LoadFailure::NotRegistered))
    }

    /// Whether a fetch was ever started for `slug` (and not forgotten).
    #[must_use]
    pub fn attempted(&self, slug: &str) -> bool {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(slug)
    }

    /// Number of memoized attempts.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn start_attempt(&self, slug: &Slug) -> Attempt {
        let registry = Arc::clone(&self.registry);
        let source = Arc::clone(&self.source);
        let path = slug.module_path(&self.root);
        let slug = slug.clone();
        let fetch_timeout = self.fetch_timeout;
        let bus = self.bus.clone();

        async move {
            info!(slug = %slug, path = %path.display(), "Fetching module");
            let fetch = source.fetch_and_execute(&slug, &path, &registry);
            let fetched = match fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, fetch).await.unwrap_or_else(|_| {
                    Err(FetchError::new(format!(
                        "timed out after {}ms",
                        limit.as_millis()
                    )))
                }),
                None => fetch.await,
            };

            if let Err(e) = fetched {
                warn!(slug = %slug, error = %e, "Module fetch failed");
                return Err(HubError::load(
                    slug.as_str(),
                    LoadFailure::Network(e.to_string()),
                ));
            }

            let Some(descriptor) = registry.get(slug.as_str()) else {
                warn!(slug = %slug, "Code unit ran but did not register");
                return Err(HubError::load(slug.as_str(), LoadFailure::NotRegistered));
            };

            let manifest = descriptor.manifest().clone();
            info!(slug = %slug, name = %manifest.name, "Module loaded");
            if let Some(bus) = bus {
                bus.publish(HubEvent::ModuleLoaded {
                    metadata: EventMetadata::new("loader"),
                    slug: slug.to_string(),
                    name: manifest.name.clone(),
                });
            }
            Ok(manifest)
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::manifest::ModuleManifest;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Register,
        Skip,
        Fail,
    }

    struct CountingSource {
        fetches: AtomicUsize,
        behaviour: Behaviour,
        delay: Duration,
    }

    impl CountingSource {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                behaviour,
                delay: Duration::from_millis(20),
            })
        }
    }

    #[async_trait]
    impl ModuleSource for CountingSource {
        async fn fetch_and_execute(
            &self,
            slug: &Slug,
            _path: &Path,
            registry: &ModuleRegistry,
        ) -> Result<(), FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.behaviour {
                Behaviour::Register => {
                    registry.register(
                        slug.clone(),
                        ModuleDescriptor::manifest_only(ModuleManifest::new(slug.clone(), "Test")),
                    );
                    Ok(())
                },
                Behaviour::Skip => Ok(()),
                Behaviour::Fail => Err(FetchError::new("connection refused")),
            }
        }
    }

    fn loader(source: &Arc<CountingSource>) -> Loader {
        Loader::new(
            Arc::new(ModuleRegistry::new()),
            Arc::clone(source) as Arc<dyn ModuleSource>,
            "/srv",
        )
    }

    #[tokio::test]
    async fn concurrent_loads_fetch_once() {
        let source = CountingSource::new(Behaviour::Register);
        let loader = loader(&source);

        let results = futures::future::join_all((0..8).map(|_| loader.load("pong"))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        loader.load("pong").await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registered_slug_resolves_without_fetch() {
        let source = CountingSource::new(Behaviour::Fail);
        let loader = loader(&source);
        let slug = Slug::new("pong").unwrap();
        loader.registry().register(
            slug.clone(),
            ModuleDescriptor::manifest_only(ModuleManifest::new(slug, "Pong")),
        );

        assert_eq!(loader.load("pong").await.unwrap().name, "Pong");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert!(!loader.attempted("pong"));
    }

    #[tokio::test]
    async fn invalid_slug_rejected_before_fetch() {
        let source = CountingSource::new(Behaviour::Register);
        let loader = loader(&source);
        let err = loader.load("../secret").await.unwrap_err();
        assert!(matches!(err, HubError::InvalidSlug { .. }));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_memoized() {
        let source = CountingSource::new(Behaviour::Fail);
        let loader = loader(&source);

        for _ in 0..3 {
            let err = loader.load("missing").await.unwrap_err();
            match err {
                HubError::ModuleLoad { slug, reason } => {
                    assert_eq!(slug, "missing");
                    assert_eq!(reason.reason(), "network failure");
                },
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_policy_forgets_failures() {
        let source = CountingSource::new(Behaviour::Fail);
        let loader = loader(&source).with_retry_failed(true);

        assert!(loader.load("missing").await.is_err());
        assert!(!loader.attempted("missing"));
        assert!(loader.load("missing").await.is_err());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unit_that_skips_registration() {
        let source = CountingSource::new(Behaviour::Skip);
        let loader = loader(&source);
        let err = loader.load("ghost").await.unwrap_err();
        assert_eq!(
            err,
            HubError::ModuleLoad {
                slug: "ghost".into(),
                reason: LoadFailure::NotRegistered
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_is_a_network_failure() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            behaviour: Behaviour::Register,
            delay: Duration::from_secs(10),
        });
        let loader = loader(&source).with_fetch_timeout(Some(Duration::from_millis(100)));
        let err = loader.load("slow").await.unwrap_err();
        assert!(matches!(
            err,
            HubError::ModuleLoad {
                reason: LoadFailure::Network(ref detail),
                ..
            } if detail.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn successful_load_publishes_event() {
        let source = CountingSource::new(Behaviour::Register);
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let loader = loader(&source).with_event_bus(bus);

        loader.load("pong").await.unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type(), "module_loaded");
    }
}
