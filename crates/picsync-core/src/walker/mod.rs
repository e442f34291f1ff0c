//! Directory walker
//!
//! Listing primitive used by the sync engine. Given one directory it
//! returns the image files directly inside it and its immediate
//! subdirectories, both in the order the filesystem lists them.
//!
//! The walker never fails: a path that is not a directory, a directory that
//! vanished or cannot be read, and entries whose metadata cannot be read all
//! come back as "nothing here". It does not open file contents.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::config::SyncConfig;

/// What one directory contains, as far as the engine cares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    /// Files whose name ends in the configured image extension
    pub image_files: Vec<PathBuf>,
    /// Immediate subdirectories to descend into
    pub subdirectories: Vec<PathBuf>,
}

impl DirectoryListing {
    /// Whether the listing has neither images nor subdirectories
    pub fn is_empty(&self) -> bool {
        self.image_files.is_empty() && self.subdirectories.is_empty()
    }
}

/// Lists image files and subdirectories of a single directory
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    /// File name suffix including the dot, e.g. `.jpg`
    suffix: String,
}

impl DirectoryWalker {
    /// Create a walker matching `extension` (with or without a leading dot)
    pub fn new(extension: &str) -> Self {
        Self {
            suffix: format!(".{}", extension.trim_start_matches('.')),
        }
    }

    /// Create a walker for the extension configured in `config`
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.normalized_extension())
    }

    /// The suffix file names must end with, e.g. `.jpg`
    pub fn image_suffix(&self) -> &str {
        &self.suffix
    }

    /// Whether a file name matches the image extension (case-sensitive)
    pub fn is_image_name(&self, name: &OsStr) -> bool {
        name.as_encoded_bytes().ends_with(self.suffix.as_bytes())
    }

    /// Whether `path` is a directory (symlinks are followed)
    pub async fn is_directory(path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    /// List the image files and subdirectories directly inside `directory`
    pub async fn list(&self, directory: &Path) -> DirectoryListing {
        let mut listing = DirectoryListing::default();

        let mut entries = match fs::read_dir(directory).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {}", directory.display(), e);
                return listing;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Listing of {} aborted: {}", directory.display(), e);
                    break;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    trace!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            // Resolve symlinks to whatever they point at
            let (is_dir, is_file) = if file_type.is_symlink() {
                match fs::metadata(&path).await {
                    Ok(target) => (target.is_dir(), target.is_file()),
                    Err(e) => {
                        trace!("Skipping dangling link {}: {}", path.display(), e);
                        continue;
                    }
                }
            } else {
                (file_type.is_dir(), file_type.is_file())
            };

            if is_dir {
                listing.subdirectories.push(path);
            } else if is_file && self.is_image_name(&entry.file_name()) {
                listing.image_files.push(path);
            }
        }

        listing
    }
}

impl Default for DirectoryWalker {
    fn default() -> Self {
        Self::new("jpg")
    }
}
