//! Domain entities and business logic
//!
//! This module contains the core domain types for flashsync:
//! - Card identity and firmware capabilities
//! - File entries with their copy lifecycle
//! - The date filter selecting which files are copied
//! - Domain-specific error types

pub mod card_identity;
pub mod errors;
pub mod file_entry;
pub mod filter;

// Re-export commonly used types
pub use card_identity::{CardIdentity, FirmwareVersion, THUMBNAIL_FAILURE_LIMIT};
pub use errors::DomainError;
pub use file_entry::{FileAttributes, FileEntry, FileStatus};
pub use filter::{TargetFilter, TargetPeriod};
