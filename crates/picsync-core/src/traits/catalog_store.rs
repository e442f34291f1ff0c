// # Catalog Store Trait
//
// Defines the interface for the persisted image catalog.
//
// ## Purpose
//
// The catalog store holds one `ImageRecord` per indexed image. The sync engine
// uses it to decide whether a directory has been indexed already (the
// directory path is the deduplication key) and to insert new records; the
// random image picker uses it to pick one record at random.
//
// ## Implementations
//
// - Memory: `MemoryCatalogStore` (this crate)
// - JSON file: `FileCatalogStore` (this crate)
// - SQLite: `SqliteCatalogStore` (`picsync-store-sqlite`)
//
// ## Usage
//
// ```rust
// use picsync_core::traits::{CatalogStore, NewImageRecord};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* CatalogStore implementation */;
//
//     if store.find_by_directory("/srv/photos/2017".as_ref()).await?.is_none() {
//         store
//             .insert(NewImageRecord::new("/srv/photos/2017", "/srv/photos/2017/a.jpg"))
//             .await?;
//     }
//
//     let any = store.pick_random().await?;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Store-assigned identifier of an image record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub i64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One indexed image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Identifier assigned by the store on insert
    pub id: ImageId,
    /// Absolute path of the directory the image was found in
    pub directory_path: PathBuf,
    /// Absolute path of the image file
    pub image_file_path: PathBuf,
    /// When the record was inserted
    pub indexed_at: chrono::DateTime<chrono::Utc>,
}

impl ImageRecord {
    /// Build a record from an insert request
    ///
    /// # Visibility
    ///
    /// Only store implementations mint records: they own id assignment.
    /// External stores (such as the SQLite crate) rebuild records from their
    /// rows with a struct literal.
    pub(crate) fn from_new(id: ImageId, new: NewImageRecord) -> Self {
        Self {
            id,
            directory_path: new.directory_path,
            image_file_path: new.image_file_path,
            indexed_at: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for ImageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Image[id={}, directory='{}', file='{}']",
            self.id,
            self.directory_path.display(),
            self.image_file_path.display()
        )
    }
}

/// Insert request for the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImageRecord {
    /// Absolute path of the directory the image was found in
    pub directory_path: PathBuf,
    /// Absolute path of the image file
    pub image_file_path: PathBuf,
}

impl NewImageRecord {
    /// Create a new insert request
    pub fn new(directory_path: impl Into<PathBuf>, image_file_path: impl Into<PathBuf>) -> Self {
        Self {
            directory_path: directory_path.into(),
            image_file_path: image_file_path.into(),
        }
    }
}

/// Trait for catalog store implementations
///
/// This trait defines the narrow contract the sync engine and the picker
/// need from the persistence layer.
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks: the
/// walk task inserts while picker calls read. The engine adds no locking of
/// its own around the store.
///
/// # Consistency
///
/// A record inserted by `insert` must be visible to any `find_by_directory`
/// or `pick_random` call issued after `insert` returns, from any caller.
///
/// # Responsibilities
///
/// Stores persist and query records. They do not walk directories, decide
/// what gets indexed (owned by `SyncEngine`) or touch image files (owned by
/// `RandomImagePicker`).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new record
    ///
    /// # Returns
    ///
    /// - `Ok(ImageId)`: The identifier assigned to the record
    /// - `Err(Error)`: Storage error
    async fn insert(&self, record: NewImageRecord) -> Result<ImageId, crate::Error>;

    /// Find the first record indexed for a directory
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ImageRecord))`: A record whose `directory_path` equals `directory`
    /// - `Ok(None)`: The directory has not been indexed
    /// - `Err(Error)`: Storage error
    async fn find_by_directory(&self, directory: &Path)
    -> Result<Option<ImageRecord>, crate::Error>;

    /// Pick one record uniformly at random
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ImageRecord))`: A random record
    /// - `Ok(None)`: The catalog is empty
    /// - `Err(Error)`: Storage error
    async fn pick_random(&self) -> Result<Option<ImageRecord>, crate::Error>;

    /// Number of records in the catalog
    async fn count(&self) -> Result<u64, crate::Error>;

    /// Remove every record
    ///
    /// Administrative and test use only; the engine never calls this.
    async fn clear_all(&self) -> Result<(), crate::Error>;

    /// Persist any pending changes
    ///
    /// Stores that write through on every insert implement this as a no-op.
    async fn flush(&self) -> Result<(), crate::Error>;
}
