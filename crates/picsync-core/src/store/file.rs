// # File Catalog Store
//
// JSON-file implementation of CatalogStore.
//
// Every change is written to disk before it becomes visible in memory: the
// new catalog goes to `<file>.tmp`, the previous file is copied to
// `<file>.backup`, and the temp file is renamed over the catalog. A failed
// write leaves both the file and the in-memory catalog as they were.
//
// On open, a catalog file that does not parse is replaced by its backup
// when the backup parses; otherwise the store starts empty.
//
// ```json
// {
//   "version": "1.0",
//   "next_id": 2,
//   "records": [
//     {
//       "id": 1,
//       "directory_path": "/srv/photos/2017",
//       "image_file_path": "/srv/photos/2017/a.jpg",
//       "indexed_at": "2025-01-09T12:00:00Z"
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::Error;
use crate::traits::catalog_store::{CatalogStore, ImageId, ImageRecord, NewImageRecord};

const CATALOG_FILE_VERSION: &str = "1.0";

/// File-based catalog store
///
/// # Example
///
/// ```rust,no_run
/// use picsync_core::store::FileCatalogStore;
/// use picsync_core::traits::{CatalogStore, NewImageRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileCatalogStore::new("/var/lib/picsync/catalog.json").await?;
///
///     // On disk once this returns
///     store.insert(NewImageRecord::new("/photos/a", "/photos/a/x.jpg")).await?;
///
///     assert_eq!(store.count().await?, 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileCatalogStore {
    path: PathBuf,
    catalog: RwLock<FileCatalog>,
    /// Held across "write file, then commit in memory"
    write_lock: Mutex<()>,
}

/// Committed catalog contents
#[derive(Debug, Default)]
struct FileCatalog {
    /// Ordered by id
    records: Vec<ImageRecord>,
    /// Position in `records` of the first record of each directory
    first_by_directory: HashMap<PathBuf, usize>,
    /// Last id handed out
    next_id: i64,
}

/// On-disk catalog format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CatalogFileFormat {
    version: String,
    next_id: i64,
    records: Vec<ImageRecord>,
}

impl FileCatalog {
    fn from_file(file: CatalogFileFormat) -> Self {
        let mut catalog = Self {
            next_id: file.next_id,
            ..Self::default()
        };
        for record in file.records {
            catalog.push(record);
        }
        catalog
    }

    fn push(&mut self, record: ImageRecord) {
        self.next_id = self.next_id.max(record.id.0);
        self.first_by_directory
            .entry(record.directory_path.clone())
            .or_insert(self.records.len());
        self.records.push(record);
    }

    fn to_file(&self, records: Vec<ImageRecord>) -> CatalogFileFormat {
        CatalogFileFormat {
            version: CATALOG_FILE_VERSION.to_string(),
            next_id: records.iter().map(|r| r.id.0).fold(self.next_id, i64::max),
            records,
        }
    }
}

impl FileCatalogStore {
    /// Open the catalog at `path`, creating parent directories if needed
    ///
    /// A missing file is an empty catalog. A corrupted file is recovered
    /// from its backup, or dropped when there is no usable backup.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create catalog directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let catalog = Self::open_catalog(&path).await?;
        debug!(
            "Loaded catalog {}: {} records",
            path.display(),
            catalog.records.len()
        );

        Ok(Self {
            path,
            catalog: RwLock::new(catalog),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the catalog file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_catalog(path: &Path) -> Result<FileCatalog, Error> {
        let file = match read_catalog_file(path).await {
            Ok(file) => file,
            Err(e) if e.is_corruption() => {
                warn!("{}. Trying the backup.", e);
                let backup = sibling(path, "backup");
                match read_catalog_file(&backup).await {
                    Ok(Some(file)) => {
                        info!(
                            "Recovered {} records from {}",
                            file.records.len(),
                            backup.display()
                        );
                        if let Err(e) = fs::copy(&backup, path).await {
                            error!("Failed to restore {} from backup: {}", path.display(), e);
                        }
                        Some(file)
                    }
                    Ok(None) => {
                        warn!("No backup found, starting with an empty catalog");
                        None
                    }
                    Err(e) => {
                        error!("Backup unusable ({}), starting with an empty catalog", e);
                        None
                    }
                }
            }
            Err(e) => return Err(e),
        };

        Ok(file.map(FileCatalog::from_file).unwrap_or_default())
    }

    /// Replace the catalog file with `file`
    ///
    /// Callers hold `write_lock`.
    async fn persist(&self, file: &CatalogFileFormat) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(file)?;

        let temp = sibling(&self.path, "tmp");
        fs::write(&temp, &json).await.map_err(|e| {
            Error::catalog_store(format!("Failed to write {}: {}", temp.display(), e))
        })?;

        if self.path.is_file()
            && let Err(e) = fs::copy(&self.path, sibling(&self.path, "backup")).await
        {
            warn!("Failed to back up {}: {}", self.path.display(), e);
        }

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(Error::catalog_store(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            )));
        }

        trace!("Catalog written to {}", self.path.display());
        Ok(())
    }
}

/// Read and parse a catalog file; `None` when it does not exist
async fn read_catalog_file(path: &Path) -> Result<Option<CatalogFileFormat>, Error> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::catalog_store(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_slice(&content).map(Some).map_err(|e| {
        Error::corrupt_catalog(format!("Cannot parse {}: {}", path.display(), e))
    })
}

/// `catalog.json` → `catalog.<extension>`
fn sibling(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

#[async_trait]
impl CatalogStore for FileCatalogStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageId, Error> {
        let _writer = self.write_lock.lock().await;

        let (record, file) = {
            let catalog = self.catalog.read().await;
            let record = ImageRecord::from_new(ImageId(catalog.next_id + 1), record);
            let mut records = catalog.records.clone();
            records.push(record.clone());
            (record, catalog.to_file(records))
        };

        self.persist(&file).await?;

        let id = record.id;
        self.catalog.write().await.push(record);
        Ok(id)
    }

    async fn find_by_directory(&self, directory: &Path) -> Result<Option<ImageRecord>, Error> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .first_by_directory
            .get(directory)
            .and_then(|&position| catalog.records.get(position))
            .cloned())
    }

    async fn pick_random(&self) -> Result<Option<ImageRecord>, Error> {
        let catalog = self.catalog.read().await;
        Ok(catalog.records.choose(&mut rand::thread_rng()).cloned())
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.catalog.read().await.records.len() as u64)
    }

    async fn clear_all(&self) -> Result<(), Error> {
        let _writer = self.write_lock.lock().await;

        let file = self.catalog.read().await.to_file(Vec::new());
        self.persist(&file).await?;

        let mut catalog = self.catalog.write().await;
        catalog.records.clear();
        catalog.first_by_directory.clear();
        info!("Catalog {} cleared", self.path.display());
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing is committed before it is on disk
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let store = FileCatalogStore::new(&path).await.unwrap();

        // Initially empty
        assert_eq!(store.count().await.unwrap(), 0);

        // Insert and find
        let id = store
            .insert(NewImageRecord::new("/photos/a", "/photos/a/x.jpg"))
            .await
            .unwrap();

        let found = store
            .find_by_directory(Path::new("/photos/a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);

        // Verify file was written
        assert!(path.exists());

        // Load new instance and verify persistence
        let store2 = FileCatalogStore::new(&path).await.unwrap();
        let found2 = store2
            .find_by_directory(Path::new("/photos/a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found2, found);

        // Ids keep counting after a reload
        let id2 = store2
            .insert(NewImageRecord::new("/photos/b", "/photos/b/y.jpg"))
            .await
            .unwrap();
        assert!(id2 > id);
    }

    #[tokio::test]
    async fn test_file_store_first_record_per_directory_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let store = FileCatalogStore::new(&path).await.unwrap();
        let first = store
            .insert(NewImageRecord::new("/photos/a", "/photos/a/x.jpg"))
            .await
            .unwrap();
        store
            .insert(NewImageRecord::new("/photos/b", "/photos/b/y.jpg"))
            .await
            .unwrap();
        store
            .insert(NewImageRecord::new("/photos/a", "/photos/a/z.jpg"))
            .await
            .unwrap();

        for store in [store, FileCatalogStore::new(&path).await.unwrap()] {
            let found = store
                .find_by_directory(Path::new("/photos/a"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.id, first);
            assert_eq!(store.count().await.unwrap(), 3);
        }
    }

    #[tokio::test]
    async fn test_file_store_failed_write_commits_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let store = FileCatalogStore::new(&path).await.unwrap();
        store
            .insert(NewImageRecord::new("/photos/a", "/photos/a/x.jpg"))
            .await
            .unwrap();

        // A non-empty directory cannot be replaced by the rename
        fs::remove_file(&path).await.unwrap();
        fs::create_dir(&path).await.unwrap();
        fs::write(path.join("occupied"), b"x").await.unwrap();

        let result = store
            .insert(NewImageRecord::new("/photos/b", "/photos/b/y.jpg"))
            .await;
        assert!(matches!(result, Err(Error::CatalogStore(_))));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(
            store
                .find_by_directory(Path::new("/photos/b"))
                .await
                .unwrap()
                .is_none()
        );

        assert!(store.clear_all().await.is_err());
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(
            store
                .find_by_directory(Path::new("/photos/a"))
                .await
                .unwrap()
                .is_some()
        );
        assert!(!sibling(&path, "tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        // Create store and insert (first write)
        let store = FileCatalogStore::new(&path).await.unwrap();
        store
            .insert(NewImageRecord::new("/photos/a", "/photos/a/x.jpg"))
            .await
            .unwrap();

        // Write again to ensure backup is created
        store
            .insert(NewImageRecord::new("/photos/b", "/photos/b/y.jpg"))
            .await
            .unwrap();

        let backup_path = sibling(&path, "backup");
        assert!(backup_path.exists(), "Backup file should exist after write");

        // Corrupt the catalog file
        fs::write(&path, b"corrupted json data").await.unwrap();

        // Load should recover from backup (should not error)
        let store2 = FileCatalogStore::new(&path)
            .await
            .expect("backup should have been recovered");

        // Backup holds the catalog as it was before the last write
        assert_eq!(store2.count().await.unwrap(), 1);
        assert!(
            store2
                .find_by_directory(Path::new("/photos/a"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_file_store_corrupt_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, b"{ \"version\": ").await.unwrap();

        let store = FileCatalogStore::new(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_store_clear_all_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.json");

        let store = FileCatalogStore::new(&path).await.unwrap();
        for i in 0..5 {
            store
                .insert(NewImageRecord::new(
                    format!("/photos/{}", i),
                    format!("/photos/{}/x.jpg", i),
                ))
                .await
                .unwrap();
        }
        store.clear_all().await.unwrap();
        store.flush().await.unwrap();

        let store2 = FileCatalogStore::new(&path).await.unwrap();
        assert_eq!(store2.count().await.unwrap(), 0);
        assert!(store2.pick_random().await.unwrap().is_none());

        // Ids are not reused after a clear
        let id = store2
            .insert(NewImageRecord::new("/photos/0", "/photos/0/x.jpg"))
            .await
            .unwrap();
        assert_eq!(id, ImageId(6));
    }
}
