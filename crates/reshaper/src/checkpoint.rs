//! Resume checkpoints.
//!
//! Each mapping keeps two values in the external checkpoint store: the
//! highest source primary key processed and the primary key of the last
//! row written to the destination. Keys are namespaced per mapping name
//! so independent mappings never interfere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::CheckpointStore;
use crate::error::{ReshapeError, Result};

/// The last successfully processed source/destination key pair for one mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Highest source primary key processed so far.
    pub last_source_key: i64,

    /// Primary key of the last row written to the destination.
    pub last_destination_key: i64,
}

impl Checkpoint {
    /// Store key holding the last source index for `mapping`.
    pub fn source_key(mapping: &str) -> String {
        format!("{}_last_source_index", mapping)
    }

    /// Store key holding the last destination index for `mapping`.
    pub fn destination_key(mapping: &str) -> String {
        format!("{}_last_destination_index", mapping)
    }

    /// Load the checkpoint for `mapping`, defaulting both keys to `0`
    /// when the store has no record yet.
    pub async fn load(store: &dyn CheckpointStore, mapping: &str) -> Result<Self> {
        Ok(Self {
            last_source_key: read_key(store, &Self::source_key(mapping)).await?,
            last_destination_key: read_key(store, &Self::destination_key(mapping)).await?,
        })
    }

    /// Persist the checkpoint for `mapping`.
    pub async fn store(&self, store: &dyn CheckpointStore, mapping: &str) -> Result<()> {
        store
            .set(&Self::source_key(mapping), &self.last_source_key.to_string())
            .await?;
        store
            .set(
                &Self::destination_key(mapping),
                &self.last_destination_key.to_string(),
            )
            .await
    }
}

async fn read_key(store: &dyn CheckpointStore, key: &str) -> Result<i64> {
    match store.get(key).await? {
        None => Ok(0),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ReshapeError::checkpoint(format!("stored value for {} is not an integer: {:?}", key, raw))
        }),
    }
}

/// JSON file-backed [`CheckpointStore`].
///
/// The whole key space is held as one flat JSON object. Writes go to a
/// temp file first and are renamed into place, so an interrupted run never
/// leaves a truncated store behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open a store at `path`, loading existing entries if the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().expect("file store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("file store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn test_key_namespacing() {
        assert_eq!(Checkpoint::source_key("movie"), "movie_last_source_index");
        assert_eq!(
            Checkpoint::destination_key("movie"),
            "movie_last_destination_index"
        );
    }

    #[tokio::test]
    async fn test_load_defaults_to_zero() {
        let store = MemoryStore::new();
        let cp = Checkpoint::load(&store, "movie").await.unwrap();
        assert_eq!(cp, Checkpoint::default());
    }

    #[tokio::test]
    async fn test_store_load_round_trip() {
        let store = MemoryStore::new();
        let cp = Checkpoint {
            last_source_key: 12,
            last_destination_key: 34,
        };
        cp.store(&store, "movie").await.unwrap();
        assert_eq!(Checkpoint::load(&store, "movie").await.unwrap(), cp);
        // Other mappings are unaffected by the namespace.
        assert_eq!(
            Checkpoint::load(&store, "author").await.unwrap(),
            Checkpoint::default()
        );
    }

    #[tokio::test]
    async fn test_unparsable_value_is_checkpoint_error() {
        let store = MemoryStore::new();
        store
            .set("movie_last_source_index", "not-a-number")
            .await
            .unwrap();
        let err = Checkpoint::load(&store, "movie").await.unwrap_err();
        assert!(matches!(err, ReshapeError::Checkpoint(_)));
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");

        let store = FileStore::open(&path).unwrap();
        store.set("movie_last_source_index", "7").await.unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened
                .get("movie_last_source_index")
                .await
                .unwrap()
                .as_deref(),
            Some("7")
        );
    }

    #[tokio::test]
    async fn test_file_store_writes_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");

        let store = FileStore::open(&path).unwrap();
        store.set("k", "1").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.get("k").map(String::as_str), Some("1"));
    }
}
