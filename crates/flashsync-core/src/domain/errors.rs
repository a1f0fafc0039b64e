//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including listing parse failures, invalid state transitions, and path errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A line of the card's file listing could not be parsed
    #[error("Invalid listing line: {0}")]
    InvalidListingLine(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Remote root URL does not have the `http(s)://host/` shape
    #[error("Invalid remote root: {0}")]
    InvalidRemoteRoot(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
