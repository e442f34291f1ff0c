// # SQLite Catalog Store
//
// This crate provides a SQLite-backed CatalogStore for the picsync system.
//
// ## Schema
//
// ```sql
// CREATE TABLE images (
//     id              INTEGER PRIMARY KEY AUTOINCREMENT,
//     directory_path  TEXT NOT NULL,
//     image_path      TEXT NOT NULL,
//     indexed_at      INTEGER NOT NULL   -- unix milliseconds, UTC
// );
// CREATE INDEX idx_images_directory_path ON images(directory_path);
// ```
//
// ## Threading
//
// `rusqlite::Connection` is not `Sync`, so the store keeps it behind a mutex
// and runs every statement on Tokio's blocking pool. Statements are short
// (single-row inserts and indexed lookups), so one connection is enough.
//
// ## Paths
//
// Paths are stored as UTF-8 text. Inserts and lookups of paths that are not
// valid UTF-8 fail with a catalog store error, so two such directories can
// never share a deduplication key.

use async_trait::async_trait;
use picsync_core::traits::{CatalogStore, ImageId, ImageRecord, NewImageRecord};
use picsync_core::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = "SELECT id, directory_path, image_path, indexed_at FROM images";

/// SQLite-backed catalog store
///
/// # Example
///
/// ```rust,no_run
/// use picsync_store_sqlite::SqliteCatalogStore;
/// use picsync_core::traits::{CatalogStore, NewImageRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = SqliteCatalogStore::open("/var/lib/picsync/catalog.db").await?;
///
///     store.insert(NewImageRecord::new("/photos/a", "/photos/a/x.jpg")).await?;
///     assert_eq!(store.count().await?, 1);
///
///     Ok(())
/// }
/// ```
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl SqliteCatalogStore {
    /// Open (or create) the catalog database at `path`
    ///
    /// Parent directories are created when missing.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create catalog directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let open_path = db_path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&open_path).map_err(|e| {
                Error::catalog_store(format!(
                    "Failed to open database {}: {}",
                    open_path.display(),
                    e
                ))
            })?;
            init_schema(&conn).map_err(sql_error)?;
            Ok(conn)
        })
        .await??;

        tracing::info!("Catalog database initialized at: {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path),
        })
    }

    /// Open a private in-memory database (not persistent)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        init_schema(&conn).map_err(sql_error)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        })
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::catalog_store("SQLite connection lock poisoned"))?;
            f(&guard).map_err(sql_error)
        })
        .await?
    }
}

impl std::fmt::Debug for SqliteCatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalogStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Create tables and indexes if they don't exist
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS images (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            directory_path  TEXT NOT NULL,
            image_path      TEXT NOT NULL,
            indexed_at      INTEGER NOT NULL
        )",
        [],
    )?;

    // Every walk step looks records up by directory
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_images_directory_path
         ON images(directory_path)",
        [],
    )?;

    Ok(())
}

fn sql_error(err: rusqlite::Error) -> Error {
    Error::catalog_store(format!("SQLite error: {}", err))
}

fn path_text(path: &Path) -> Result<String> {
    path.to_str().map(str::to_owned).ok_or_else(|| {
        Error::catalog_store(format!(
            "Path is not valid UTF-8: {}",
            path.display()
        ))
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let directory_path: String = row.get(1)?;
    let image_path: String = row.get(2)?;
    let indexed_at_ms: i64 = row.get(3)?;

    Ok(ImageRecord {
        id: ImageId(row.get(0)?),
        directory_path: PathBuf::from(directory_path),
        image_file_path: PathBuf::from(image_path),
        indexed_at: chrono::DateTime::from_timestamp_millis(indexed_at_ms).unwrap_or_default(),
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageId> {
        let directory_path = path_text(&record.directory_path)?;
        let image_path = path_text(&record.image_file_path)?;
        let indexed_at = chrono::Utc::now().timestamp_millis();

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO images (directory_path, image_path, indexed_at) VALUES (?1, ?2, ?3)",
                params![directory_path, image_path, indexed_at],
            )?;
            Ok(ImageId(conn.last_insert_rowid()))
        })
        .await
    }

    async fn find_by_directory(&self, directory: &Path) -> Result<Option<ImageRecord>> {
        let directory_path = path_text(directory)?;

        self.with_connection(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE directory_path = ?1 ORDER BY id LIMIT 1"),
                params![directory_path],
                record_from_row,
            )
            .optional()
        })
        .await
    }

    async fn pick_random(&self) -> Result<Option<ImageRecord>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} ORDER BY RANDOM() LIMIT 1"),
                [],
                record_from_row,
            )
            .optional()
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn clear_all(&self) -> Result<()> {
        self.with_connection(|conn| {
            let removed = conn.execute("DELETE FROM images", [])?;
            tracing::info!("Cleared {} records from catalog", removed);
            Ok(())
        })
        .await
    }

    async fn flush(&self) -> Result<()> {
        // Autocommit: every statement is already durable
        Ok(())
    }
}
