//! Hub error types.

use deepfly_storage::StorageError;

/// Why a module could not be made available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadFailure {
    /// The code unit could not be fetched or executed.
    #[error("network failure: {0}")]
    Network(String),

    /// The code unit ran but never registered its slug.
    #[error("did not self-register")]
    NotRegistered,

    /// The registered descriptor carries no mount entry point.
    #[error("descriptor has no mount entry point")]
    MissingEntryPoint,
}

impl LoadFailure {
    /// Short reason without the underlying detail.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Network(_) => "network failure",
            Self::NotRegistered => "did not self-register",
            Self::MissingEntryPoint => "missing mount entry point",
        }
    }
}

/// Errors surfaced by `open` and `load`.
///
/// Every variant is fatal to the one operation that produced it; the hub
/// itself keeps running. `Clone` so a memoized load result can be handed to
/// every caller that joined the same attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The slug is malformed. Raised before any I/O.
    #[error("invalid slug {slug:?}: {reason}")]
    InvalidSlug {
        /// The rejected input.
        slug: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Fetching, registering, or resolving the entry point failed.
    #[error("failed to load module '{slug}': {reason}")]
    ModuleLoad {
        /// Requested slug.
        slug: String,
        /// Failure detail.
        reason: LoadFailure,
    },

    /// The module's `mount` returned an error or panicked.
    #[error("failed to mount module '{slug}': {message}")]
    Mount {
        /// Requested slug.
        slug: String,
        /// Failure detail.
        message: String,
    },
}

impl HubError {
    /// The slug the failed operation was about.
    #[must_use]
    pub fn slug(&self) -> &str {
        match self {
            Self::InvalidSlug { slug, .. }
            | Self::ModuleLoad { slug, .. }
            | Self::Mount { slug, .. } => slug,
        }
    }

    pub(crate) fn load(slug: impl Into<String>, reason: LoadFailure) -> Self {
        Self::ModuleLoad {
            slug: slug.into(),
            reason,
        }
    }

    pub(crate) fn mount(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mount {
            slug: slug.into(),
            message: message.into(),
        }
    }
}

/// Result alias for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Errors a module reports from `mount` or `unmount`.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Free-form failure.
    #[error("{0}")]
    Failed(String),

    /// A store capability call failed.
    #[error("store error: {0}")]
    Storage(#[from] StorageError),
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Failed`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
