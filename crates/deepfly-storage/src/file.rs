//! JSON-file backend.
//!
//! The whole store is one JSON document mapping namespace → key → value.
//! It is read once on open and rewritten on every mutation through a
//! temporary file in the same directory followed by an atomic rename, so a
//! crash mid-write never leaves a truncated document behind. Mutations are
//! applied to a copy that only replaces the in-memory document once it is
//! on disk.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvStore, validate_key, validate_namespace};

type Document = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Persistent store backed by a single JSON file.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    data: RwLock<Document>,
}

impl FileKvStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// A missing file is treated as an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file exists but cannot be read,
    /// or [`StorageError::Serialization`] if it is not a valid store document.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, &e))?;
        }

        let data = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Document::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store file not found, starting empty");
                Document::new()
            },
            Err(e) => return Err(io_err(&path, &e)),
        };

        info!(path = %path.display(), namespaces = data.len(), "opened file store");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &Document) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(dir, &e))?;
        tmp.write_all(&bytes).map_err(|e| io_err(tmp.path(), &e))?;
        tmp.persist(&self.path)
            .map_err(|e| io_err(&self.path, &e.error))?;
        Ok(())
    }

    /// Run `change` on a copy of the document. If the copy differs it is
    /// written out and then swapped in; on error memory is left as it was.
    fn update<T>(&self, change: impl FnOnce(&mut Document) -> T) -> StorageResult<T> {
        let mut data = self.data.write().map_err(poisoned)?;
        let mut next = data.clone();
        let result = change(&mut next);
        if next != *data {
            self.persist(&next)?;
            *data = next;
        }
        Ok(result)
    }
}

fn io_err(path: &Path, e: &std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        self.update(|data| {
            data.entry(namespace.to_owned())
                .or_default()
                .insert(key.to_owned(), value);
        })
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        self.update(|data| {
            data.get_mut(namespace)
                .is_some_and(|ns| ns.remove(key).is_some())
        })
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let removed = self.update(|data| data.remove(namespace).map_or(0, |ns| ns.len()))?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = FileKvStore::open(&path).unwrap();
            store
                .set("deepfly.game.runner", "best", b"42".to_vec())
                .await
                .unwrap();
        }

        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("deepfly.game.runner", "best").await.unwrap(),
            Some(b"42".to_vec())
        );
    }

    #[tokio::test]
    async fn missing_file_opens_empty_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = FileKvStore::open(&path).unwrap();
        assert!(store.list_keys("any").await.unwrap().is_empty());
        assert!(path.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileKvStore::open(&path),
            Err(StorageError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn delete_and_clear_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileKvStore::open(&path).unwrap();
        store.set("a", "x", vec![1]).await.unwrap();
        store.set("a", "y", vec![2]).await.unwrap();
        store.set("b", "z", vec![3]).await.unwrap();
        assert!(store.delete("a", "x").await.unwrap());
        assert_eq!(store.clear_namespace("b").await.unwrap(), 1);
        drop(store);

        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(reopened.list_keys("a").await.unwrap(), vec!["y".to_owned()]);
        assert!(reopened.list_keys("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        let store = FileKvStore::open(state.join("store.json")).unwrap();
        store.set("a", "x", vec![1]).await.unwrap();

        // Replace the directory with a file so no temp file can be created.
        std::fs::remove_dir_all(&state).unwrap();
        std::fs::write(&state, b"").unwrap();

        assert!(matches!(
            store.set("a", "x", vec![2]).await,
            Err(StorageError::Io { .. })
        ));
        assert!(store.set("a", "y", vec![3]).await.is_err());
        assert!(store.delete("a", "x").await.is_err());
        assert!(store.clear_namespace("a").await.is_err());

        assert_eq!(store.get("a", "x").await.unwrap(), Some(vec![1]));
        assert_eq!(store.list_keys("a").await.unwrap(), vec!["x".to_owned()]);
    }

    #[tokio::test]
    async fn unchanged_document_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        let store = FileKvStore::open(state.join("store.json")).unwrap();
        store.set("a", "x", vec![1]).await.unwrap();

        std::fs::remove_dir_all(&state).unwrap();
        std::fs::write(&state, b"").unwrap();

        store.set("a", "x", vec![1]).await.unwrap();
        assert!(!store.delete("a", "missing").await.unwrap());
        assert_eq!(store.clear_namespace("empty").await.unwrap(), 0);
    }
}
