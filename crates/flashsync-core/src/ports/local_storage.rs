//! Local storage port (driven/secondary port)
//!
//! This module defines the interface for the local side of a copy:
//! checking whether a copy already exists, writing downloaded bytes,
//! aligning timestamps with the card, and moving copies of files deleted
//! on the card into a recycle folder.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//! - Paths are plain `Path`s composed by the orchestrator from the
//!   configured local folder; the port does not know about the card.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

// ============================================================================
// FileSystemState struct
// ============================================================================

/// Snapshot of a local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemState {
    /// Whether the path exists on disk
    pub exists: bool,
    /// Whether this is a regular file
    pub is_file: bool,
    /// Size in bytes (0 for directories or non-existent files)
    pub size: u64,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_file: false,
            size: 0,
        }
    }

    /// Returns true if the path is a regular file of exactly `size` bytes
    pub fn is_file_of_size(&self, size: u64) -> bool {
        self.exists && self.is_file && self.size == size
    }
}

// ============================================================================
// FileTimes struct
// ============================================================================

/// Timestamps to stamp on a freshly written copy
///
/// Both values are card-local wall clock times; the adapter interprets
/// them in the local time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    /// Capture time (EXIF date when available, otherwise the card date)
    pub created: NaiveDateTime,
    /// Card-reported modification time
    pub modified: NaiveDateTime,
}

// ============================================================================
// ILocalStorage trait
// ============================================================================

/// Local filesystem operations needed by the copy cycle
#[async_trait::async_trait]
pub trait ILocalStorage: Send + Sync {
    /// Returns the state of `path`; a missing path is not an error
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState>;

    /// Creates `path` and any missing parents
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()>;

    /// Writes `data` to `path`, replacing any existing file
    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()>;

    /// Reads the whole file at `path`
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>>;

    /// Aligns the file's timestamps with the card
    async fn set_times(&self, path: &Path, times: FileTimes) -> anyhow::Result<()>;

    /// Moves existing files into the recycle folder.
    ///
    /// Missing files are skipped. Returns the new locations of the moved files.
    async fn move_to_recycle(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>>;
}
