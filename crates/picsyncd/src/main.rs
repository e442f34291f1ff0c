// # picsyncd - picsync Daemon
//
// The picsyncd daemon is a thin integration layer around picsync-core.
// Indexing policy, single-flight handling and store semantics all live in
// the library; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Opens the configured catalog store
// 4. Runs the start-up walk and resynchronizes on request
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Indexing
// - `PICSYNC_ROOT`: Root directory to index (required)
// - `PICSYNC_SYNC_ON_STARTUP`: Walk once at start-up (true/false, default true)
// - `PICSYNC_IMAGE_EXTENSION`: Indexed file extension, case-sensitive (default jpg)
//
// ### Catalog Store
// - `PICSYNC_STORE_TYPE`: Type of catalog store (memory, file, sqlite; default file)
// - `PICSYNC_STORE_PATH`: Path to the catalog file (for file and sqlite stores)
//
// ### Daemon
// - `PICSYNC_SHUTDOWN_TIMEOUT_SECS`: How long shutdown waits for a running walk (default 30)
// - `PICSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Signals
//
// - `SIGHUP`: Start a resynchronization (ignored while a walk is running)
// - `SIGTERM` / `SIGINT`: Wait for a running walk, flush the catalog, exit
//
// ## Example
//
// ```bash
// export PICSYNC_ROOT=/srv/photos
// export PICSYNC_STORE_TYPE=sqlite
// export PICSYNC_STORE_PATH=/var/lib/picsync/catalog.db
//
// picsyncd
// ```

use anyhow::Result;
use picsync_core::traits::CatalogStore;
use picsync_core::{
    CatalogStoreConfig, EngineEvent, FileCatalogStore, MemoryCatalogStore, SyncConfig, SyncEngine,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PicsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PicsyncExitCode> for ExitCode {
    fn from(code: PicsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration, as read from the environment
#[derive(Debug)]
struct Config {
    root: Option<String>,
    sync_on_startup: Option<String>,
    image_extension: Option<String>,
    store_type: String,
    store_path: Option<String>,
    shutdown_timeout_secs: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            root: lookup("PICSYNC_ROOT"),
            sync_on_startup: lookup("PICSYNC_SYNC_ON_STARTUP"),
            image_extension: lookup("PICSYNC_IMAGE_EXTENSION"),
            store_type: lookup("PICSYNC_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            store_path: lookup("PICSYNC_STORE_PATH"),
            shutdown_timeout_secs: lookup("PICSYNC_SHUTDOWN_TIMEOUT_SECS"),
            log_level: lookup("PICSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Validate the configuration and build the library configuration
    ///
    /// Checks:
    /// - Required fields are present
    /// - Booleans and numbers parse, timeouts are in range
    /// - Store type is known and has a path where it needs one
    /// - Log level is valid
    fn sync_config(&self) -> Result<SyncConfig> {
        let root = match self.root.as_deref() {
            Some(root) if !root.trim().is_empty() => root,
            _ => anyhow::bail!(
                "PICSYNC_ROOT is required. \
                Set it via: export PICSYNC_ROOT=/srv/photos"
            ),
        };

        let mut config = SyncConfig::new(root).with_store(self.store_config()?);

        if let Some(value) = self.sync_on_startup.as_deref() {
            config = config.with_sync_on_startup(parse_flag("PICSYNC_SYNC_ON_STARTUP", value)?);
        }

        if let Some(extension) = self.image_extension.as_deref() {
            config = config.with_image_extension(extension.trim());
        }

        config.validate()?;
        Ok(config)
    }

    fn store_config(&self) -> Result<CatalogStoreConfig> {
        let path = || -> Result<PathBuf> {
            match self.store_path.as_deref() {
                Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
                Some(_) => anyhow::bail!(
                    "PICSYNC_STORE_PATH cannot be empty when PICSYNC_STORE_TYPE={}",
                    self.store_type
                ),
                None => anyhow::bail!(
                    "PICSYNC_STORE_PATH is required when PICSYNC_STORE_TYPE={}. \
                    Set it via: export PICSYNC_STORE_PATH=/var/lib/picsync/catalog",
                    self.store_type
                ),
            }
        };

        match self.store_type.as_str() {
            "memory" => Ok(CatalogStoreConfig::Memory),
            "file" => Ok(CatalogStoreConfig::File { path: path()? }),
            "sqlite" => Ok(CatalogStoreConfig::Sqlite { path: path()? }),
            _ => anyhow::bail!(
                "PICSYNC_STORE_TYPE '{}' is not supported. \
                Supported types: memory, file, sqlite",
                self.store_type
            ),
        }
    }

    fn shutdown_timeout(&self) -> Result<Duration> {
        let Some(value) = self.shutdown_timeout_secs.as_deref() else {
            return Ok(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS));
        };

        let secs: u64 = value.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "PICSYNC_SHUTDOWN_TIMEOUT_SECS must be a number of seconds. Got: {}",
                value
            )
        })?;

        if !(1..=3600).contains(&secs) {
            anyhow::bail!(
                "PICSYNC_SHUTDOWN_TIMEOUT_SECS must be between 1 and 3600 seconds. Got: {}",
                secs
            );
        }

        Ok(Duration::from_secs(secs))
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "PICSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", name, value),
    }
}

/// Everything the daemon needs once configuration is validated
struct DaemonSettings {
    sync: SyncConfig,
    shutdown_timeout: Duration,
}

fn main() -> ExitCode {
    let config = Config::from_env();

    let (settings, log_level) = match config
        .sync_config()
        .and_then(|sync| Ok((sync, config.shutdown_timeout()?, config.log_level()?)))
    {
        Ok((sync, shutdown_timeout, log_level)) => (
            DaemonSettings {
                sync,
                shutdown_timeout,
            },
            log_level,
        ),
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return PicsyncExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PicsyncExitCode::ConfigError.into();
    }

    info!("Starting picsyncd daemon");
    info!(
        "Configuration loaded: root={}, extension=.{}, store={}",
        settings.sync.root.display(),
        settings.sync.normalized_extension(),
        settings.sync.store.type_name()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PicsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(settings)).into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(settings: DaemonSettings) -> PicsyncExitCode {
    let store = match open_store(&settings.sync.store).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open catalog store: {}", e);
            return PicsyncExitCode::ConfigError;
        }
    };

    let (engine, event_rx) = match SyncEngine::new(store, settings.sync) {
        Ok(created) => created,
        Err(e) => {
            error!("Failed to create sync engine: {}", e);
            return PicsyncExitCode::ConfigError;
        }
    };

    let event_logger = tokio::spawn(log_events(event_rx));

    if engine.initial_synchronization() {
        info!("Start-up synchronization running");
    }

    info!("Daemon initialized successfully, indexing {}", engine.root().display());

    let result = serve(&engine, settings.shutdown_timeout).await;

    drop(engine);
    event_logger.abort();

    match result {
        Ok(()) => {
            info!("Shutting down daemon");
            PicsyncExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            PicsyncExitCode::RuntimeError
        }
    }
}

/// Handle signals until shutdown, then drain and flush
async fn serve(engine: &SyncEngine, shutdown_timeout: Duration) -> Result<()> {
    let signal = wait_for_shutdown(engine).await?;
    info!("Received shutdown signal: {}", signal);

    let drained = engine.await_completion_timeout(shutdown_timeout).await;
    if drained.is_err() {
        warn!(
            "Walk still running after {:?}, flushing catalog anyway",
            shutdown_timeout
        );
    }

    engine.store().flush().await?;
    debug!("Catalog flushed");

    drained.map_err(|e| anyhow::anyhow!("Shutdown did not drain the running walk: {}", e))
}

/// Open the configured catalog store
async fn open_store(config: &CatalogStoreConfig) -> Result<Arc<dyn CatalogStore>> {
    let store: Arc<dyn CatalogStore> = match config {
        CatalogStoreConfig::Memory => {
            warn!("Using in-memory catalog: the catalog is rebuilt on every start");
            Arc::new(MemoryCatalogStore::new())
        }
        CatalogStoreConfig::File { path } => Arc::new(FileCatalogStore::new(path).await?),
        #[cfg(feature = "sqlite")]
        CatalogStoreConfig::Sqlite { path } => {
            Arc::new(picsync_store_sqlite::SqliteCatalogStore::open(path).await?)
        }
        #[cfg(not(feature = "sqlite"))]
        CatalogStoreConfig::Sqlite { .. } => anyhow::bail!(
            "PICSYNC_STORE_TYPE=sqlite requires picsyncd to be built with the 'sqlite' feature"
        ),
    };

    info!(
        "Catalog store '{}' opened with {} record(s)",
        config.type_name(),
        store.count().await?
    );

    Ok(store)
}

/// Log engine events until the engine is dropped
async fn log_events(mut event_rx: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            EngineEvent::WalkStarted { root } => debug!("Walk started at {}", root.display()),
            EngineEvent::ImageIndexed {
                id,
                image_file_path,
                ..
            } => info!("Indexed {} as {}", image_file_path.display(), id),
            EngineEvent::DirectorySkipped { directory_path } => {
                debug!("Already indexed: {}", directory_path.display())
            }
            EngineEvent::WalkFinished { summary } => {
                if summary.store_failures > 0 {
                    warn!(
                        "Walk finished with {} catalog failure(s)",
                        summary.store_failures
                    );
                }
            }
        }
    }
}

/// Wait for a shutdown signal (SIGTERM, SIGINT), resynchronizing on SIGHUP
///
/// # Returns
///
/// Returns the name of the shutdown signal received.
#[cfg(unix)]
async fn wait_for_shutdown(engine: &SyncEngine) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => return Ok("SIGTERM"),
            _ = sigint.recv() => return Ok("SIGINT"),
            _ = sighup.recv() => {
                if engine.trigger_synchronization() {
                    info!("SIGHUP: resynchronization started");
                } else {
                    info!("SIGHUP: walk already running, request ignored");
                }
            }
        }
    }
}

/// Wait for a shutdown signal (Ctrl-C only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown(_engine: &SyncEngine) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
