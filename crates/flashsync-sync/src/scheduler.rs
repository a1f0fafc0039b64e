//! Auto-check scheduler - runs check-and-copy on a recurring timer
//!
//! The [`AutoCheckScheduler`] drives a [`SyncOrchestrator`] until it is
//! shut down or stopped through the orchestrator's [`StopHandle`].
//!
//! ## Flow
//!
//! ```text
//! sleep(interval) ──→ execute_auto_check ──→ ok ────────────────┐
//!        ↑                    │                                 │
//!        │                    └─→ failed ──→ sleep(cooldown) ───┤
//!        └──────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler holds the orchestrator mutably for its whole lifetime, so a
//! tick can never overlap a check or copy started elsewhere.
//!
//! [`StopHandle`]: crate::orchestrator::StopHandle

use std::time::Duration;

use flashsync_core::config::AutoCheckConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::OperationStatus;
use crate::orchestrator::SyncOrchestrator;
use crate::SyncError;

// ============================================================================
// AutoCheckScheduler struct
// ============================================================================

/// Recurring auto-check timer
#[derive(Debug, Clone)]
pub struct AutoCheckScheduler {
    /// Pause between the end of one tick and the next
    interval: Duration,
    /// Extra pause after a failed tick
    failure_cooldown: Duration,
}

impl AutoCheckScheduler {
    pub fn new(config: &AutoCheckConfig) -> Self {
        Self::with_timing(config.interval(), config.failure_cooldown())
    }

    pub fn with_timing(interval: Duration, failure_cooldown: Duration) -> Self {
        Self {
            interval,
            failure_cooldown,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs auto checks until `shutdown` fires or the orchestrator's stop
    /// handle is used.
    ///
    /// Only unexpected errors end the loop early; every other failure is a
    /// status and the next tick retries.
    pub async fn run(
        &self,
        orchestrator: &mut SyncOrchestrator,
        shutdown: CancellationToken,
    ) -> Result<(), SyncError> {
        let stop = orchestrator.stop_handle();
        let auto = stop.begin_auto();

        info!(
            interval_secs = self.interval.as_secs(),
            cooldown_secs = self.failure_cooldown.as_secs(),
            "Auto check starting"
        );

        orchestrator.refresh_thumbnails_filled();
        orchestrator.set_auto_running(true);
        orchestrator.set_status(OperationStatus::WaitingAutoCheck);

        let result = self.run_loop(orchestrator, &auto, &shutdown).await;

        orchestrator.set_auto_running(false);
        stop.end_auto();
        orchestrator.set_status(OperationStatus::Stopped);

        info!("Auto check stopped");
        result
    }

    async fn run_loop(
        &self,
        orchestrator: &mut SyncOrchestrator,
        auto: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> Result<(), SyncError> {
        loop {
            if !Self::pause(self.interval, auto, shutdown).await {
                return Ok(());
            }

            debug!("Auto check tick");
            let completed = orchestrator.execute_auto_check().await?;

            if !completed {
                debug!(
                    cooldown_ms = self.failure_cooldown.as_millis() as u64,
                    "Auto check failed, cooling down"
                );
                if !Self::pause(self.failure_cooldown, auto, shutdown).await {
                    return Ok(());
                }
            }

            if auto.is_cancelled() || shutdown.is_cancelled() {
                return Ok(());
            }
            orchestrator.set_status(OperationStatus::WaitingAutoCheck);
        }
    }

    /// Sleeps for `length`; false when cancelled first
    async fn pause(length: Duration, auto: &CancellationToken, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = auto.cancelled() => false,
            _ = tokio::time::sleep(length) => true,
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
