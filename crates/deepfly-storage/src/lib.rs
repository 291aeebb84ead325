//! DeepFly Storage - persistence behind the module `store` capability.
//!
//! Every mounted module receives a [`ScopedKvStore`] bound to its own
//! namespace (`deepfly.game.{slug}`), so two games can use the same key
//! without colliding. Two backends implement [`KvStore`]:
//!
//! - [`MemoryKvStore`]: ephemeral, for tests and kiosk sessions
//! - [`FileKvStore`]: a single JSON document on disk that survives restarts
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use deepfly_storage::{MemoryKvStore, ScopedKvStore};
//!
//! # async fn example() -> deepfly_storage::StorageResult<()> {
//! let store = ScopedKvStore::new(Arc::new(MemoryKvStore::new()), "deepfly.game.pong")?;
//! store.set_json("settings.vfx", &false).await?;
//! assert!(!store.get_or("settings.vfx", true).await);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod file;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use file::FileKvStore;
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};
