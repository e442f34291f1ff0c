//! Test doubles and common utilities for contract tests
//!
//! This module provides image trees on disk and catalog stores that count
//! or hold back calls, so tests can observe what the engine does and when.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use picsync_core::error::{Error, Result};
use picsync_core::store::MemoryCatalogStore;
use picsync_core::traits::{CatalogStore, ImageId, ImageRecord, NewImageRecord};
use picsync_core::{EngineEvent, SyncConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

/// A directory tree in a temporary directory
pub struct ImageTree {
    dir: TempDir,
}

impl ImageTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    /// Root of the tree
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `relative` inside the tree
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Create a directory (and its parents)
    pub fn dir(&self, relative: &str) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(&path).expect("create dir");
        path
    }

    /// Write a small, valid image; the format follows the extension
    pub fn image(&self, relative: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        RgbImage::from_pixel(16, 12, Rgb([30, 120, 200]))
            .save(&path)
            .expect("write image");
        path
    }

    /// Write arbitrary bytes
    pub fn file(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write file");
        path
    }
}

/// Helper to create a minimal SyncConfig for testing
pub fn minimal_config(root: &Path) -> SyncConfig {
    SyncConfig::new(root).with_sync_on_startup(false)
}

/// Collect every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Number of walks that started, according to the events
pub fn walks_started(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, EngineEvent::WalkStarted { .. }))
        .count()
}

/// A catalog store that counts calls and can fail lookups or inserts on demand
#[derive(Default)]
pub struct MockCatalogStore {
    inner: MemoryCatalogStore,
    find_call_count: AtomicUsize,
    insert_call_count: AtomicUsize,
    failing_lookups: AtomicUsize,
    failing_inserts: AtomicUsize,
}

impl MockCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` lookups fail
    pub fn fail_next_lookups(&self, n: usize) {
        self.failing_lookups.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` inserts fail
    pub fn fail_next_inserts(&self, n: usize) {
        self.failing_inserts.store(n, Ordering::SeqCst);
    }

    /// Get the number of times find_by_directory() was called
    pub fn find_call_count(&self) -> usize {
        self.find_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times insert() was called
    pub fn insert_call_count(&self) -> usize {
        self.insert_call_count.load(Ordering::SeqCst)
    }

    /// All stored records in insertion order
    pub async fn records(&self) -> Vec<ImageRecord> {
        self.inner.records().await
    }
}

#[async_trait]
impl CatalogStore for MockCatalogStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageId> {
        self.insert_call_count.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_inserts) {
            return Err(Error::catalog_store("injected insert failure"));
        }
        self.inner.insert(record).await
    }

    async fn find_by_directory(&self, directory: &Path) -> Result<Option<ImageRecord>> {
        self.find_call_count.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_lookups) {
            return Err(Error::catalog_store("injected lookup failure"));
        }
        self.inner.find_by_directory(directory).await
    }

    async fn pick_random(&self) -> Result<Option<ImageRecord>> {
        self.inner.pick_random().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    async fn clear_all(&self) -> Result<()> {
        self.inner.clear_all().await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Decrement `counter` unless it is zero; whether it was decremented
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// A catalog store whose lookups block until the test opens the gate
///
/// Lets a test hold a walk in the `Running` state for as long as it needs.
pub struct GatedCatalogStore {
    inner: MemoryCatalogStore,
    gate: watch::Sender<bool>,
    entered: watch::Sender<bool>,
    find_call_count: AtomicUsize,
}

impl GatedCatalogStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryCatalogStore::new(),
            gate: watch::channel(false).0,
            entered: watch::channel(false).0,
            find_call_count: AtomicUsize::new(0),
        }
    }

    /// Let every pending and future lookup through
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until a walk reached its first lookup
    pub async fn wait_until_entered(&self) {
        let mut rx = self.entered.subscribe();
        let _ = rx.wait_for(|entered| *entered).await;
    }

    /// Get the number of times find_by_directory() was called
    pub fn find_call_count(&self) -> usize {
        self.find_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogStore for GatedCatalogStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageId> {
        self.inner.insert(record).await
    }

    async fn find_by_directory(&self, directory: &Path) -> Result<Option<ImageRecord>> {
        self.find_call_count.fetch_add(1, Ordering::SeqCst);
        self.entered.send_replace(true);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        self.inner.find_by_directory(directory).await
    }

    async fn pick_random(&self) -> Result<Option<ImageRecord>> {
        self.inner.pick_random().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    async fn clear_all(&self) -> Result<()> {
        self.inner.clear_all().await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
