//! Event types carried by the hub bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Component that produced the event (`"lifecycle"`, `"router"`, a slug).
    pub source: String,
}

impl EventMetadata {
    /// Create metadata stamped with the current time.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Everything that can travel over the hub bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// A module's code unit ran and registered itself.
    ModuleLoaded {
        /// Event metadata.
        metadata: EventMetadata,
        /// Slug of the loaded module.
        slug: String,
        /// Display name from the manifest.
        name: String,
    },

    /// A module finished mounting and is now the active instance.
    ModuleMounted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Slug of the mounted module.
        slug: String,
    },

    /// The active instance was torn down.
    ModuleUnmounted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Slug of the unmounted module.
        slug: String,
        /// `false` when the module's own `unmount` failed or panicked (the
        /// teardown still completed).
        clean: bool,
    },

    /// An `open` attempt failed and the hub fell back to idle.
    OpenFailed {
        /// Event metadata.
        metadata: EventMetadata,
        /// The slug that was requested.
        slug: String,
        /// Rendered error.
        error: String,
    },

    /// A transient user-visible message (toast).
    Notice {
        /// Event metadata.
        metadata: EventMetadata,
        /// Text to show.
        message: String,
        /// How long the host should keep it on screen.
        duration_ms: u64,
    },

    /// The navigation token changed.
    Navigated {
        /// Event metadata.
        metadata: EventMetadata,
        /// The new token (empty when no module is active).
        token: String,
    },

    /// A message on a module's private channel.
    Module {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning module; only that module's [`ModuleBus`](crate::ModuleBus)
        /// receivers see the message.
        slug: String,
        /// Module-defined topic.
        topic: String,
        /// Module-defined payload.
        payload: Value,
    },
}

impl HubEvent {
    /// Stable snake-case name of the event kind.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ModuleLoaded { .. } => "module_loaded",
            Self::ModuleMounted { .. } => "module_mounted",
            Self::ModuleUnmounted { .. } => "module_unmounted",
            Self::OpenFailed { .. } => "open_failed",
            Self::Notice { .. } => "notice",
            Self::Navigated { .. } => "navigated",
            Self::Module { .. } => "module",
        }
    }

    /// The event's metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::ModuleLoaded { metadata, .. }
            | Self::ModuleMounted { metadata, .. }
            | Self::ModuleUnmounted { metadata, .. }
            | Self::OpenFailed { metadata, .. }
            | Self::Notice { metadata, .. }
            | Self::Navigated { metadata, .. }
            | Self::Module { metadata, .. } => metadata,
        }
    }
}
