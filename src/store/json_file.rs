//! [`Store`] backed by a single JSON document on disk.
//!
//! The whole document is held in memory and rewritten on every change via a
//! temporary sibling file followed by a rename. The map lock is held across
//! the write, so concurrent `set` calls reach the disk in the order they
//! acquired the lock and the file always reflects the last completed write.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::Store;
use crate::error::StoreError;

/// JSON-file store. One file, one top-level object.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, reading existing contents. A missing file
    /// yields an empty store; the file is created on first write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                StoreError::Invalid(format!("{}: {}", path.display(), err))
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StoreError::Io(err)),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened json store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Returns the backing path used for persistence.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.path, &payload).await?;
        Ok(())
    }
}

/// Writes data atomically by using a temporary sibling file followed by rename.
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// `store.json` writes through `store.json.tmp`, so stores that differ only
/// in extension never share a temporary file.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(err) = self.flush(&entries).await {
            // Keep memory in line with what is on disk.
            match previous {
                Some(prev) => entries.insert(key.to_string(), prev),
                None => entries.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(false);
        };
        if let Err(err) = self.flush(&entries).await {
            entries.insert(key.to_string(), previous);
            return Err(err);
        }
        Ok(true)
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(store.entries().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_set_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.set("tree", json!({"id": "x", "children": []})).await.unwrap();
        store.set("other", json!(42)).await.unwrap();
        assert!(store.delete("other").await.unwrap());
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("tree").await.unwrap(),
            Some(json!({"id": "x", "children": []}))
        );
        assert!(reopened.get("other").await.unwrap().is_none());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_tmp_path_keeps_extension() {
        let dir = std::path::Path::new("/data");
        assert_eq!(
            tmp_path(&dir.join("layers.json")),
            dir.join("layers.json.tmp")
        );
        assert_ne!(
            tmp_path(&dir.join("layers.json")),
            tmp_path(&dir.join("layers.toml"))
        );
    }

    #[tokio::test]
    async fn test_sibling_stores_do_not_share_tmp_file() {
        let dir = tempdir().unwrap();
        let json = JsonFileStore::open(dir.path().join("store.json")).await.unwrap();
        let other = JsonFileStore::open(dir.path().join("store.bak")).await.unwrap();

        let (a, b) = tokio::join!(json.set("k", json!("json")), other.set("k", json!("bak")));
        a.unwrap();
        b.unwrap();

        let json = JsonFileStore::open(dir.path().join("store.json")).await.unwrap();
        let other = JsonFileStore::open(dir.path().join("store.bak")).await.unwrap();
        assert_eq!(json.get("k").await.unwrap(), Some(json!("json")));
        assert_eq!(other.get("k").await.unwrap(), Some(json!("bak")));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_concurrent_sets_leave_last_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = std::sync::Arc::new(JsonFileStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set("tree", json!(i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let in_memory = store.get("tree").await.unwrap();
        let on_disk: BTreeMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get("tree").cloned(), in_memory);
    }
}
