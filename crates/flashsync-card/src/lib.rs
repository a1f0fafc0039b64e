//! flashsync Card - FlashAir CGI client
//!
//! Provides async access to a Wi-Fi SD card's built-in HTTP interface:
//! - File listing, thumbnails, downloads and deletion
//! - Firmware, CID, SSID and update-state queries
//! - A resilient transfer primitive with bounded retry, header/body
//!   timeouts, cooperative cancellation and link liveness monitoring
//!
//! ## Modules
//!
//! - [`client`] - Typed card operations on top of the transfer primitive
//! - [`command`] - The fixed CGI command vocabulary and URL composition
//! - [`transfer`] - The resilient GET primitive

pub mod client;
pub mod command;
pub mod transfer;

pub use client::CardClient;
pub use command::CardCommand;
pub use transfer::{DownloadRequest, Transfer, TransferPolicy};

use thiserror::Error;

/// Errors that can occur when talking to the card
///
/// Every low-level transport fault is resolved into one of these variants
/// before it leaves this crate.
#[derive(Debug, Error)]
pub enum CardError {
    /// The card could not be reached or rejected the request (400/401/500).
    /// Retried a bounded number of times.
    #[error("Unable to connect to the card (status {status:?}): {reason}")]
    ConnectionUnable {
        /// HTTP status, when the card answered at all
        status: Option<u16>,
        /// Transport or status description
        reason: String,
    },

    /// The link to the card went down while a request was in flight
    #[error("Connection to the card was lost")]
    ConnectionLost,

    /// The card answered 404 for this path
    #[error("Remote file not found: {0}")]
    RemoteFileNotFound(String),

    /// Size on the wire differs from the size in the listing
    #[error("Remote file invalid: {0}")]
    RemoteFileInvalid(String),

    /// The card has no thumbnail for this file
    #[error("Thumbnail unavailable: {0}")]
    ThumbnailUnavailable(String),

    /// `upload.cgi?DEL=` did not confirm the deletion
    #[error("Failed to delete {path}: {reason}")]
    DeletionFailed {
        /// Remote path that was to be deleted
        path: String,
        /// Card response or reason
        reason: String,
    },

    /// No answer within the configured timeout while the link stayed up
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The card answered with a status outside its documented set
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// Anything that could not be classified
    #[error("Unexpected card error: {0}")]
    Unexpected(String),
}

impl CardError {
    /// Only "connection unable" failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, CardError::ConnectionUnable { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CardError::Cancelled)
    }
}
