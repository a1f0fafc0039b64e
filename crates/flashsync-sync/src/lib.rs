//! flashsync Sync - Check and copy orchestration
//!
//! Provides:
//! - The file catalog and its merge/reconcile rules
//! - The check and copy phases, with cooperative stop
//! - The recurring auto-check loop
//! - Linux adapters for local storage and network probing
//!
//! ## Modules
//!
//! - [`catalog`] - Sorted catalog of card files
//! - [`events`] - Orchestrator state, user-facing statuses and the event stream
//! - [`filesystem`] - Local storage adapter (atomic writes, timestamps, recycle)
//! - [`images`] - EXIF reader and thumbnail renderer
//! - [`layout`] - Local path layout of copied files
//! - [`network`] - Network probe adapter
//! - [`orchestrator`] - Check and copy phases
//! - [`preview`] - Local preview loading on its own cancellation scope
//! - [`scheduler`] - Auto-check loop

pub mod catalog;
pub mod events;
pub mod filesystem;
pub mod images;
pub mod layout;
pub mod network;
pub mod orchestrator;
pub mod preview;
pub mod scheduler;

use std::path::{Path, PathBuf};

use flashsync_card::CardError;
use flashsync_core::domain::DomainError;
use thiserror::Error;

pub use catalog::FileCatalog;
pub use events::{OperationStatus, OrchestratorState, SyncEvent};
pub use orchestrator::{StopHandle, SyncOrchestrator};
pub use preview::{PreviewLoader, PreviewOutcome};
pub use scheduler::AutoCheckScheduler;

/// Errors that can occur during check and copy operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A card request failed
    #[error(transparent)]
    Card(#[from] CardError),

    /// The CID read before copying differs from the one seen while checking
    #[error("The card was changed since the last check")]
    CardChanged,

    /// Delete-on-copy is configured but the card has uploading disabled
    #[error("Deletion is disabled on the card")]
    UploadDisabled,

    /// Insufficient filesystem permissions
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Any other local storage failure
    #[error("Local storage error: {0}")]
    LocalStorage(anyhow::Error),

    /// A domain-level error propagated from flashsync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The run was stopped
    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Maps a storage port failure, recognising permission errors
    pub fn from_storage(err: anyhow::Error, path: &Path) -> Self {
        match err.downcast_ref::<std::io::Error>() {
            Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                SyncError::PermissionDenied(path.to_path_buf())
            }
            _ => SyncError::LocalStorage(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled | SyncError::Card(CardError::Cancelled))
    }

    /// The user-facing status this error ends a run with
    pub fn status(&self) -> OperationStatus {
        match self {
            SyncError::Card(card) => match card {
                CardError::ConnectionUnable { .. } => OperationStatus::ConnectionUnable,
                CardError::ConnectionLost => OperationStatus::ConnectionLost,
                CardError::Timeout(_) => OperationStatus::TimedOut,
                CardError::Cancelled => OperationStatus::Stopped,
                CardError::DeletionFailed { .. } => OperationStatus::DeleteFailed,
                CardError::RemoteFileNotFound(_)
                | CardError::RemoteFileInvalid(_)
                | CardError::ThumbnailUnavailable(_)
                | CardError::UnexpectedStatus { .. }
                | CardError::Unexpected(_) => OperationStatus::Error,
            },
            SyncError::CardChanged => OperationStatus::NotSameCard,
            SyncError::UploadDisabled => OperationStatus::DeleteDisabled,
            SyncError::PermissionDenied(_) => OperationStatus::UnauthorizedAccess,
            SyncError::LocalStorage(_) | SyncError::Domain(_) => OperationStatus::Error,
            SyncError::Cancelled => OperationStatus::Stopped,
        }
    }

    /// Errors without a dedicated status end the run and are surfaced
    pub fn is_unexpected(&self) -> bool {
        self.status() == OperationStatus::Error
    }
}

/// Whether a storage port failure means the path does not exist
pub(crate) fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}
