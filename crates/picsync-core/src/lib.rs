// # picsync-core
//
// Core library for the picsync image catalog.
//
// ## Architecture Overview
//
// This library indexes image files found under a root directory into a
// persisted catalog and serves random images from it:
// - **CatalogStore**: Trait for the persisted catalog (insert, lookup by directory, random pick)
// - **DirectoryWalker**: Lists the image files and subdirectories of one directory
// - **SyncEngine**: Walks the tree, indexes new directories, single-flight with completion wait
// - **RandomImagePicker**: Loads a random catalog image and re-encodes it as JPEG
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Indexing policy lives in the engine, persistence in stores
// 2. **Single-flight**: At most one walk at a time; redundant triggers are dropped
// 3. **Degrade, don't fail**: Filesystem and decode errors are logged and skipped
// 4. **Library-First**: Hosts (daemon, web server) only wire configuration and stores
// 5. **Idempotency**: Per-directory catalog lookups make repeated walks insert nothing

pub mod traits;
pub mod walker;
pub mod engine;
pub mod picker;
pub mod config;
pub mod error;
pub mod store;

// Re-export core types for convenience
pub use traits::{CatalogStore, ImageId, ImageRecord, NewImageRecord};
pub use walker::{DirectoryListing, DirectoryWalker};
pub use engine::{EngineEvent, SyncEngine, SyncState, WalkSummary};
pub use picker::{RandomImagePicker, encode_jpeg};
pub use config::{CatalogStoreConfig, EngineConfig, SyncConfig};
pub use error::{Error, Result};
pub use store::{FileCatalogStore, MemoryCatalogStore};
