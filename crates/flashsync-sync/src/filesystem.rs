//! Local storage adapter (secondary/driven adapter)
//!
//! Implements [`ILocalStorage`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: Uses write-to-temp + rename so a copy interrupted by
//!   a lost connection or a crash never leaves a file of the right name but
//!   the wrong content. The orchestrator treats "exists with matching size"
//!   as already copied.
//! - **Timestamps**: Linux has no settable birth time. The modification time
//!   gets the card date and the access time gets the capture date.
//! - **Recycle folder**: Moved files keep their name; collisions get a
//!   ` (n)` suffix before the extension.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeZone};
use filetime::FileTime;
use flashsync_core::ports::{FileSystemState, FileTimes, ILocalStorage};
use tracing::{debug, instrument, warn};

// ============================================================================
// LocalStorageAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalStorage`] port to the real filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorageAdapter {
    recycle_dir: PathBuf,
}

impl LocalStorageAdapter {
    /// Create an adapter that recycles into `recycle_dir`.
    #[must_use]
    pub fn new(recycle_dir: impl Into<PathBuf>) -> Self {
        Self {
            recycle_dir: recycle_dir.into(),
        }
    }

    pub fn recycle_dir(&self) -> &Path {
        &self.recycle_dir
    }

    /// First free name for `file_name` inside the recycle folder
    async fn recycle_target(&self, file_name: &str) -> anyhow::Result<PathBuf> {
        let candidate = self.recycle_dir.join(file_name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file_name, None),
        };

        let mut n = 1u32;
        loop {
            let name = match ext {
                Some(ext) => format!("{stem} ({n}).{ext}"),
                None => format!("{stem} ({n})"),
            };
            let candidate = self.recycle_dir.join(name);
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

/// Interprets a card wall clock time in the local time zone
fn to_file_time(value: NaiveDateTime) -> FileTime {
    let stamp = Local
        .from_local_datetime(&value)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| value.and_utc().timestamp());
    FileTime::from_unix_time(stamp, 0)
}

// ============================================================================
// ILocalStorage implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStorage for LocalStorageAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(FileSystemState {
            exists: true,
            is_file: metadata.is_file(),
            size: if metadata.is_file() { metadata.len() } else { 0 },
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(path = %path.display(), bytes = data.len()))]
    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Same directory so the rename stays on one filesystem
        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        debug!(?tmp_path, "writing to temporary file");
        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp_path, path).await?;

        debug!("write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        let data = tokio::fs::read(path).await?;
        debug!(bytes = data.len(), "file read complete");
        Ok(data)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn set_times(&self, path: &Path, times: FileTimes) -> anyhow::Result<()> {
        let accessed = to_file_time(times.created);
        let modified = to_file_time(times.modified);
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || filetime::set_file_times(&path, accessed, modified))
            .await??;
        Ok(())
    }

    #[instrument(skip(self, paths), fields(count = paths.len()))]
    async fn move_to_recycle(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
        let mut moved = Vec::new();

        for path in paths {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "Skipping path without a file name");
                continue;
            };
            if !tokio::fs::try_exists(path).await? {
                debug!(path = %path.display(), "Nothing to recycle");
                continue;
            }

            tokio::fs::create_dir_all(&self.recycle_dir).await?;
            let target = self.recycle_target(file_name).await?;

            if let Err(e) = tokio::fs::rename(path, &target).await {
                // Recycle folder on another filesystem
                debug!(error = %e, "rename failed, copying instead");
                tokio::fs::copy(path, &target).await?;
                tokio::fs::remove_file(path).await?;
            }

            debug!(from = %path.display(), to = %target.display(), "recycled");
            moved.push(target);
        }

        Ok(moved)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
