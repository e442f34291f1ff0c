//! Configuration types for the picsync system
//!
//! This module defines all configuration structures used throughout the crate.
//! The library never reads configuration on its own; a host (the `picsyncd`
//! daemon, a web server, a test) builds a [`SyncConfig`] and hands it over.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root directory to scan for images
    pub root: PathBuf,

    /// Whether a walk runs automatically when the host starts
    #[serde(default = "default_sync_on_startup")]
    pub sync_on_startup: bool,

    /// Image file extension to index (case-sensitive, without the dot)
    #[serde(default = "default_image_extension")]
    pub image_extension: String,

    /// Catalog store configuration
    #[serde(default)]
    pub store: CatalogStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a new configuration for the given root with defaults
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sync_on_startup: default_sync_on_startup(),
            image_extension: default_image_extension(),
            store: CatalogStoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the image extension (a leading dot is tolerated)
    pub fn with_image_extension(mut self, extension: impl Into<String>) -> Self {
        self.image_extension = extension.into();
        self
    }

    /// Enable or disable the startup walk
    pub fn with_sync_on_startup(mut self, enabled: bool) -> Self {
        self.sync_on_startup = enabled;
        self
    }

    /// Set the catalog store
    pub fn with_store(mut self, store: CatalogStoreConfig) -> Self {
        self.store = store;
        self
    }

    /// The configured extension without any leading dot
    pub fn normalized_extension(&self) -> &str {
        self.image_extension.trim_start_matches('.')
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.root.as_os_str().is_empty() {
            return Err(crate::Error::config("Root directory cannot be empty"));
        }

        let extension = self.normalized_extension();
        if extension.is_empty() {
            return Err(crate::Error::config("Image extension cannot be empty"));
        }
        if extension.contains('/') || extension.contains('\\') {
            return Err(crate::Error::config(format!(
                "Image extension must not contain a path separator: {}",
                self.image_extension
            )));
        }

        self.store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Catalog store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogStoreConfig {
    /// In-memory catalog (not persistent)
    #[default]
    Memory,

    /// JSON file catalog
    File {
        /// Path to the catalog file
        path: PathBuf,
    },

    /// SQLite catalog (provided by the `picsync-store-sqlite` crate)
    Sqlite {
        /// Path to the database file
        path: PathBuf,
    },
}

impl CatalogStoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            CatalogStoreConfig::Memory => Ok(()),
            CatalogStoreConfig::File { path } | CatalogStoreConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err(crate::Error::config(format!(
                        "{} catalog store path cannot be empty",
                        self.type_name()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            CatalogStoreConfig::Memory => "memory",
            CatalogStoreConfig::File { .. } => "file",
            CatalogStoreConfig::Sqlite { .. } => "sqlite",
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_sync_on_startup() -> bool {
    true
}

fn default_image_extension() -> String {
    "jpg".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}
