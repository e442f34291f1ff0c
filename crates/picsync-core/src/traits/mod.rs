//! Core traits for the picsync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`CatalogStore`]: Persisted catalog of indexed images

pub mod catalog_store;

pub use catalog_store::{CatalogStore, ImageId, ImageRecord, NewImageRecord};
