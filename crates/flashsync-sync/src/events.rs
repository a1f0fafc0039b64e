//! Orchestrator state, user-facing statuses and the event stream
//!
//! The orchestrator never calls into a UI. It publishes [`SyncEvent`]s on an
//! unbounded channel and whoever holds the receiver renders them.

use std::fmt;

use flashsync_core::{domain::FileStatus, ports::ProgressInfo};

/// What the orchestrator is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Checking,
    Copying,
    CheckingAndCopying,
    /// Waiting for the next auto-check tick
    AutoWaiting,
}

impl OrchestratorState {
    pub(crate) fn from_flags(checking: bool, copying: bool, auto_running: bool) -> Self {
        match (checking, copying) {
            (true, true) => OrchestratorState::CheckingAndCopying,
            (true, false) => OrchestratorState::Checking,
            (false, true) => OrchestratorState::Copying,
            (false, false) if auto_running => OrchestratorState::AutoWaiting,
            (false, false) => OrchestratorState::Idle,
        }
    }
}

/// User-facing outcome or progress of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Checking,
    CheckCompleted,
    Copying,
    CopyCompleted { files: usize, seconds: u64 },
    NoFileToBeCopied,
    Stopped,
    WaitingAutoCheck,
    ConnectionUnable,
    ConnectionLost,
    TimedOut,
    UnauthorizedAccess,
    NotSameCard,
    DeleteDisabled,
    DeleteFailed,
    NoNetwork,
    NoTargetDates,
    Completed,
    Error,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Checking => write!(f, "Checking files"),
            OperationStatus::CheckCompleted => write!(f, "Check completed"),
            OperationStatus::Copying => write!(f, "Copying files"),
            OperationStatus::CopyCompleted { files, seconds } => {
                write!(f, "Copied {files} files in {seconds} seconds")
            }
            OperationStatus::NoFileToBeCopied => write!(f, "No file to be copied"),
            OperationStatus::Stopped => write!(f, "Stopped"),
            OperationStatus::WaitingAutoCheck => write!(f, "Waiting for next auto check"),
            OperationStatus::ConnectionUnable => write!(f, "Unable to connect to the card"),
            OperationStatus::ConnectionLost => write!(f, "Connection to the card was lost"),
            OperationStatus::TimedOut => write!(f, "Timed out"),
            OperationStatus::UnauthorizedAccess => {
                write!(f, "Access to the local folder was denied")
            }
            OperationStatus::NotSameCard => write!(f, "The card is not the same as before"),
            OperationStatus::DeleteDisabled => write!(f, "Deletion is disabled on the card"),
            OperationStatus::DeleteFailed => write!(f, "Failed to delete a file on the card"),
            OperationStatus::NoNetwork => write!(f, "No network is available"),
            OperationStatus::NoTargetDates => write!(f, "No target dates are selected"),
            OperationStatus::Completed => write!(f, "Completed"),
            OperationStatus::Error => write!(f, "An unexpected error occurred"),
        }
    }
}

/// Something the observer may want to render
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    State(OrchestratorState),
    Status(OperationStatus),
    Progress(ProgressInfo),
    /// Path of the entry being worked on, `None` once a run ends
    Selection(Option<String>),
    EntryChanged { path: String, status: FileStatus },
}
