// # Catalog Store Implementations
//
// This module provides implementations of the CatalogStore trait for
// different persistence strategies. The SQLite store lives in its own
// crate (`picsync-store-sqlite`) to keep the bundled SQLite build optional.

pub mod file;
pub mod memory;

pub use file::FileCatalogStore;
pub use memory::MemoryCatalogStore;
