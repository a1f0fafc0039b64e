//! flashsync Daemon - Background photo sync service
//!
//! This binary runs as a systemd user service and handles:
//! - Recurring check-and-copy against one Wi-Fi SD card
//! - Rendering orchestrator events as log lines
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the Linux adapters and the card client into a
//! `SyncOrchestrator`, then hands it to the `AutoCheckScheduler`. The loop
//! is controlled by a `CancellationToken` that is triggered on receipt of
//! SIGTERM or SIGINT, together with the orchestrator's `StopHandle` so that
//! a run in flight unwinds as well.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use flashsync_card::CardClient;
use flashsync_core::config::Config;
use flashsync_core::ports::INetworkProbe;
use flashsync_sync::{
    filesystem::LocalStorageAdapter, images::ImageInspector, network::NetworkProbeAdapter,
    AutoCheckScheduler, StopHandle, SyncEvent, SyncOrchestrator,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "FLASHSYNC_CONFIG";

// ============================================================================
// Configuration and logging
// ============================================================================

/// The config file to read: `FLASHSYNC_CONFIG` when set and non-empty,
/// the platform default otherwise
fn config_path(env: Option<OsString>) -> PathBuf {
    env.filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Loads `path`, or the defaults when the file does not exist.
///
/// A file that exists but does not parse is an error rather than a silent
/// fallback.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn validate(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
    anyhow::bail!("Invalid configuration:\n  {}", listed.join("\n  "))
}

/// `RUST_LOG` wins over the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing(config: &Config) {
    let filter = env_filter(&config.logging.level);
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Event rendering
// ============================================================================

/// Renders one orchestrator event as a tracing event
fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::Status(status) => info!(%status, "Status"),
        SyncEvent::State(state) => debug!(?state, "State"),
        SyncEvent::Progress(progress) => debug!(
            bytes = progress.bytes_transferred,
            total = progress.total_bytes,
            percent = (progress.fraction() * 100.0).round() as u32,
            "Progress"
        ),
        SyncEvent::Selection(Some(path)) => debug!(%path, "Working on"),
        SyncEvent::Selection(None) => {}
        SyncEvent::EntryChanged { path, status } => {
            info!(%path, status = status.name(), "File status")
        }
    }
}

fn spawn_event_logger(mut events: mpsc::UnboundedReceiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    })
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the orchestrator and runs it until shutdown
struct DaemonService {
    config: Config,
    orchestrator: SyncOrchestrator,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Builds the adapters, the card client and the orchestrator
    fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let probe: Arc<dyn INetworkProbe> = Arc::new(
            NetworkProbeAdapter::new(&config.card.remote_root)
                .context("Failed to create network probe")?,
        );
        let storage = Arc::new(LocalStorageAdapter::new(config.sync.recycle_folder()));
        let client = CardClient::new(&config, Arc::clone(&probe))
            .context("Failed to create card client")?;

        let (orchestrator, events) = SyncOrchestrator::new(
            &config,
            Arc::new(client),
            storage,
            Arc::new(ImageInspector),
            probe,
        );

        Ok(Self {
            config,
            orchestrator,
            events,
            shutdown,
        })
    }

    fn stop_handle(&self) -> StopHandle {
        self.orchestrator.stop_handle()
    }

    /// Runs the auto-check loop until the shutdown token fires
    async fn run(mut self) -> Result<()> {
        let logger = spawn_event_logger(self.events);

        info!(
            remote_root = %self.config.card.remote_root,
            local_folder = %self.config.sync.local_folder.display(),
            interval_secs = self.config.auto_check.interval_secs,
            "Starting auto check"
        );

        let scheduler = AutoCheckScheduler::new(&self.config.auto_check);
        let result = scheduler
            .run(&mut self.orchestrator, self.shutdown.clone())
            .await;

        // Dropping the orchestrator closes the event channel
        drop(self.orchestrator);
        if let Err(e) = logger.await {
            warn!(error = %e, "Event logger ended abnormally");
        }

        result.context("Auto check failed")
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT, stops the active run and triggers the
/// cancellation token
async fn shutdown_signal(token: CancellationToken, stop: StopHandle) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    stop.stop();
    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::var_os(CONFIG_ENV));
    let config = load_config(&config_path)?;
    validate(&config)?;

    init_tracing(&config);
    info!(config_path = %config_path.display(), "flashsync daemon starting (flashsyncd)");
    if !config_path.exists() {
        warn!("No configuration file found, using defaults");
    }

    let shutdown_token = CancellationToken::new();
    let service = DaemonService::new(config, shutdown_token.clone())?;

    let signal_token = shutdown_token.clone();
    let stop = service.stop_handle();
    tokio::spawn(async move {
        shutdown_signal(signal_token, stop).await;
    });

    let result = service.run().await;

    match &result {
        Ok(()) => info!("flashsync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "flashsync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
