//! Core synchronization engine
//!
//! The SyncEngine is responsible for:
//! - Walking the configured root directory tree
//! - Checking the catalog for directories indexed before
//! - Inserting one record per newly seen directory
//! - Making sure at most one walk runs at a time
//! - Letting callers wait until a walk has finished
//!
//! ## Architecture
//!
//! ```text
//!   trigger_synchronization()          await_completion()
//!              │                               │
//!              ▼                               ▼
//!     ┌─────────────────┐   Idle/Running  ┌─────────┐
//!     │   SyncEngine    │────────────────▶│ waiters │
//!     └─────────────────┘   (watch chan)  └─────────┘
//!              │ spawn (single slot)
//!              ▼
//!     ┌─────────────────┐
//!     │    walk task    │─── EngineEvent ───▶ (monitoring)
//!     └─────────────────┘
//!         │         │
//!         ▼         ▼
//! ┌──────────────┐ ┌──────────────┐
//! │DirectoryWalker│ │ CatalogStore │
//! │   (list)     │ │(find/insert) │
//! └──────────────┘ └──────────────┘
//! ```
//!
//! ## Walk
//!
//! 1. Skip paths that are not directories
//! 2. For each image file: if the catalog has no record for this directory,
//!    insert one; otherwise leave the directory alone
//! 3. Descend into subdirectories, depth-first, in listing order
//! 4. Return to `Idle` and release every waiter
//!
//! The directory path is the deduplication key, so each directory
//! contributes at most one image (the first one listed) and repeated walks
//! over an unchanged tree insert nothing.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::traits::{CatalogStore, ImageId, NewImageRecord};
use crate::walker::DirectoryWalker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

/// Synchronization state shared by all callers of one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No walk in progress
    Idle,
    /// A walk is in progress
    Running,
}

/// Counters collected during one walk
///
/// Informational only: a walk that could not read half the tree still ends
/// in `Idle` like any other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Directories listed
    pub directories_visited: usize,
    /// Records inserted
    pub images_indexed: usize,
    /// Directories with images that already had a record
    pub directories_already_indexed: usize,
    /// Catalog lookups or inserts that failed
    pub store_failures: usize,
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A walk started
    WalkStarted { root: PathBuf },

    /// A new record was inserted
    ImageIndexed {
        id: ImageId,
        directory_path: PathBuf,
        image_file_path: PathBuf,
    },

    /// A directory with images already had a record
    DirectorySkipped { directory_path: PathBuf },

    /// A walk finished
    WalkFinished { summary: WalkSummary },
}

/// Core synchronization engine
///
/// Cheap to clone: clones share the same state, store and event channel.
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start walks with [`SyncEngine::trigger_synchronization()`]
/// 3. Wait for them with [`SyncEngine::await_completion()`]
///
/// ## Threading
///
/// Walks run on a spawned Tokio task, so triggering requires a Tokio
/// runtime. The `Idle`/`Running` flag lives in a `watch` channel: the
/// `Idle → Running` check-and-set and the wake-up of waiters both happen
/// under that channel's lock, which gives a total order between "walk
/// started", "walk finished" and "waiter released".
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    /// Catalog to consult and update
    store: Arc<dyn CatalogStore>,

    /// Listing primitive
    walker: DirectoryWalker,

    /// Absolute root directory
    root: PathBuf,

    /// Whether `initial_synchronization` starts a walk
    sync_on_startup: bool,

    /// Idle/Running flag
    state: watch::Sender<SyncState>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new synchronization engine
    ///
    /// # Parameters
    ///
    /// - `store`: Catalog store implementation
    /// - `config`: Synchronization configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Arc<dyn CatalogStore>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let root = std::path::absolute(&config.root).map_err(|e| {
            Error::config(format!(
                "Cannot resolve root directory {}: {}",
                config.root.display(),
                e
            ))
        })?;

        let (event_tx, event_rx) = mpsc::channel(config.engine.event_channel_capacity);
        let (state, _) = watch::channel(SyncState::Idle);

        let engine = Self {
            inner: Arc::new(EngineInner {
                store,
                walker: DirectoryWalker::from_config(&config),
                root,
                sync_on_startup: config.sync_on_startup,
                state,
                event_tx,
            }),
        };

        Ok((engine, event_rx))
    }

    /// Start a walk unless one is already running
    ///
    /// Returns immediately. When a walk is already in progress this is a
    /// no-op: nothing is started and nothing is queued.
    ///
    /// # Returns
    ///
    /// - `true`: A walk was started
    /// - `false`: A walk was already running, or no Tokio runtime is available
    pub fn trigger_synchronization(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("Cannot start a walk outside of a Tokio runtime");
            return false;
        };

        let started = self.inner.state.send_if_modified(|state| {
            if *state == SyncState::Idle {
                *state = SyncState::Running;
                true
            } else {
                false
            }
        });

        if !started {
            debug!("Walk already running, trigger ignored");
            return false;
        }

        info!(
            "[Started] Indexing images, starting from {}",
            self.inner.root.display()
        );

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            // Reset even if the walk panics
            let _idle = IdleOnDrop(&inner.state);
            inner.walk().await;
        });

        true
    }

    /// Start a walk if the configuration asks for one at startup
    pub fn initial_synchronization(&self) -> bool {
        if self.inner.sync_on_startup {
            self.trigger_synchronization()
        } else {
            info!("Startup synchronization disabled");
            false
        }
    }

    /// Wait until no walk is running
    ///
    /// Returns immediately when the engine is idle. Any number of callers
    /// may wait for the same walk; all are released together.
    pub async fn await_completion(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `inner`, which `self` keeps alive
        let _ = rx.wait_for(|state| *state == SyncState::Idle).await;
    }

    /// Wait until no walk is running, giving up after `timeout`
    ///
    /// The walk itself is not cancelled.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The engine is idle
    /// - `Err(Error::Timeout)`: A walk was still running when the timeout expired
    pub async fn await_completion_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.await_completion())
            .await
            .map_err(|_| Error::Timeout(timeout))
    }

    /// Current synchronization state
    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    /// Whether a walk is in progress
    pub fn is_running(&self) -> bool {
        self.state() == SyncState::Running
    }

    /// Absolute root directory being indexed
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// The catalog store the engine writes to
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.inner.store
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("root", &self.inner.root)
            .field("image_suffix", &self.inner.walker.image_suffix())
            .field("state", &self.state())
            .finish()
    }
}

/// Puts the engine back to `Idle` when the walk task ends
struct IdleOnDrop<'a>(&'a watch::Sender<SyncState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(SyncState::Idle);
    }
}

impl EngineInner {
    /// Walk the whole tree once
    ///
    /// Iterative depth-first traversal. Each pending directory carries its
    /// depth, and `ancestors` holds the canonical paths of the directories
    /// on the way down to it. A directory whose canonical path is already an
    /// ancestor closes a symlink cycle and is not entered again. Other
    /// aliases of a directory (a link beside its target) are walked and
    /// indexed under their own path.
    async fn walk(&self) {
        let mut summary = WalkSummary::default();
        self.emit_event(EngineEvent::WalkStarted {
            root: self.root.clone(),
        });

        let mut pending = vec![(self.root.clone(), 0usize)];
        let mut ancestors: Vec<PathBuf> = Vec::new();

        while let Some((directory, depth)) = pending.pop() {
            ancestors.truncate(depth);

            trace!("Going to potential directory: {}", directory.display());
            if !DirectoryWalker::is_directory(&directory).await {
                continue;
            }

            let canonical = tokio::fs::canonicalize(&directory)
                .await
                .unwrap_or_else(|_| directory.clone());
            if ancestors.contains(&canonical) {
                warn!(
                    "Directory {} leads back to {}, not descending",
                    directory.display(),
                    canonical.display()
                );
                continue;
            }
            ancestors.push(canonical);

            debug!("Going to directory: {}", directory.display());
            summary.directories_visited += 1;

            let listing = self.walker.list(&directory).await;
            self.index_directory(&directory, &listing.image_files, &mut summary)
                .await;

            // Reversed so the first listed subdirectory is popped first
            pending.extend(
                listing
                    .subdirectories
                    .into_iter()
                    .rev()
                    .map(|subdirectory| (subdirectory, depth + 1)),
            );
        }

        info!(
            "[Finished] Indexing images: {} directories visited, {} images indexed, \
            {} directories already indexed, {} store failures",
            summary.directories_visited,
            summary.images_indexed,
            summary.directories_already_indexed,
            summary.store_failures
        );
        self.emit_event(EngineEvent::WalkFinished { summary });
    }

    /// Apply the per-directory indexing policy
    ///
    /// The lookup is repeated for every file until a record exists, so a
    /// failed insert falls through to the next file.
    async fn index_directory(
        &self,
        directory: &Path,
        image_files: &[PathBuf],
        summary: &mut WalkSummary,
    ) {
        for image_file in image_files {
            match self.store.find_by_directory(directory).await {
                Ok(Some(existing)) => {
                    trace!("Directory already indexed by {}", existing);
                    summary.directories_already_indexed += 1;
                    self.emit_event(EngineEvent::DirectorySkipped {
                        directory_path: directory.to_path_buf(),
                    });
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        "Catalog lookup failed for {}: {}",
                        directory.display(),
                        e
                    );
                    summary.store_failures += 1;
                    return;
                }
            }

            let record = NewImageRecord::new(directory, image_file.as_path());
            match self.store.insert(record).await {
                Ok(id) => {
                    info!(
                        "Indexed image {} as {} for {}",
                        image_file.display(),
                        id,
                        directory.display()
                    );
                    summary.images_indexed += 1;
                    self.emit_event(EngineEvent::ImageIndexed {
                        id,
                        directory_path: directory.to_path_buf(),
                        image_file_path: image_file.clone(),
                    });
                    return;
                }
                Err(e) => {
                    error!("Failed to index image {}: {}", image_file.display(), e);
                    summary.store_failures += 1;
                }
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Event channel full, dropping event. Consider increasing \
                    event_channel_capacity or draining events faster."
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("No event receiver, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCatalogStore;

    fn engine_for(root: &str) -> (SyncEngine, mpsc::Receiver<EngineEvent>) {
        SyncEngine::new(
            Arc::new(MemoryCatalogStore::new()),
            SyncConfig::new(root),
        )
        .expect("engine construction succeeds")
    }

    #[test]
    fn test_new_engine_is_idle_with_absolute_root() {
        let (engine, _event_rx) = engine_for("relative/photos");

        assert_eq!(engine.state(), SyncState::Idle);
        assert!(!engine.is_running());
        assert!(engine.root().is_absolute());
        assert!(engine.root().ends_with("relative/photos"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = SyncEngine::new(Arc::new(MemoryCatalogStore::new()), SyncConfig::new(""));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_trigger_outside_runtime_is_refused() {
        let (engine, _event_rx) = engine_for("/srv/photos");

        assert!(!engine.trigger_synchronization());
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_missing_root_walk_finishes_empty() {
        let (engine, mut event_rx) = engine_for("/definitely/not/a/real/picsync/root");

        assert!(engine.trigger_synchronization());
        engine.await_completion().await;
        assert_eq!(engine.state(), SyncState::Idle);

        assert!(matches!(
            event_rx.recv().await,
            Some(EngineEvent::WalkStarted { .. })
        ));
        assert_eq!(
            event_rx.recv().await,
            Some(EngineEvent::WalkFinished {
                summary: WalkSummary::default()
            })
        );
    }

    #[tokio::test]
    async fn test_startup_flag_controls_initial_walk() {
        let store = Arc::new(MemoryCatalogStore::new());
        let config = SyncConfig::new("/srv/photos").with_sync_on_startup(false);
        let (engine, _event_rx) = SyncEngine::new(store, config).unwrap();

        assert!(!engine.initial_synchronization());
        assert_eq!(engine.state(), SyncState::Idle);
    }
}
