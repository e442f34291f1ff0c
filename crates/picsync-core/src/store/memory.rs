// # Memory Catalog Store
//
// In-memory implementation of CatalogStore.
//
// ## Purpose
//
// Provides a simple, fast catalog that doesn't persist across restarts.
// Useful for testing, or for hosts that are fine re-indexing the tree on
// every start.
//
// ## Restart Behavior
//
// - All records are lost on restart/crash
// - The first walk after a restart indexes every directory again

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use tokio::sync::RwLock;

use crate::traits::catalog_store::{CatalogStore, ImageId, ImageRecord, NewImageRecord};
use crate::Error;

/// In-memory catalog store implementation
///
/// Records live in an id-ordered map; a second map remembers the first
/// record inserted for each directory so `find_by_directory` is a lookup.
///
/// # Example
///
/// ```rust,no_run
/// use picsync_core::store::MemoryCatalogStore;
/// use picsync_core::traits::{CatalogStore, NewImageRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryCatalogStore::new();
///
///     store.insert(NewImageRecord::new("/photos/a", "/photos/a/x.jpg")).await?;
///
///     let record = store.find_by_directory("/photos/a".as_ref()).await?;
///     assert!(record.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogStore {
    inner: Arc<RwLock<MemoryCatalog>>,
}

#[derive(Debug, Default)]
struct MemoryCatalog {
    records: BTreeMap<ImageId, ImageRecord>,
    first_by_directory: HashMap<PathBuf, ImageId>,
    next_id: i64,
}

impl MemoryCatalogStore {
    /// Create a new empty memory catalog store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// Snapshot of all records in insertion order
    pub async fn records(&self) -> Vec<ImageRecord> {
        self.inner.read().await.records.values().cloned().collect()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageId, Error> {
        let mut guard = self.inner.write().await;
        guard.next_id += 1;
        let id = ImageId(guard.next_id);

        guard
            .first_by_directory
            .entry(record.directory_path.clone())
            .or_insert(id);
        guard.records.insert(id, ImageRecord::from_new(id, record));
        Ok(id)
    }

    async fn find_by_directory(&self, directory: &Path) -> Result<Option<ImageRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .first_by_directory
            .get(directory)
            .and_then(|id| guard.records.get(id))
            .cloned())
    }

    async fn pick_random(&self) -> Result<Option<ImageRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .records
            .values()
            .choose(&mut rand::thread_rng())
            .cloned())
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.inner.read().await.records.len() as u64)
    }

    async fn clear_all(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.records.clear();
        guard.first_by_directory.clear();
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing is buffered
        Ok(())
    }
}
