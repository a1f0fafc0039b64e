//! Local preview loading
//!
//! Browsing the catalog reads local copies on a cancellation scope of its
//! own, so a preview never waits for (or stops) a running check or copy.
//! Starting a new load cancels the previous one.

use std::sync::{Arc, Mutex, PoisonError};

use flashsync_core::{domain::FileEntry, ports::ILocalStorage};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{is_not_found, layout::LocalLayout};

/// Result of one preview load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Loaded(Vec<u8>),
    /// The local copy is gone
    Missing,
    /// The local copy exists but cannot be read or decoded
    Unreadable,
    /// A newer load replaced this one
    Cancelled,
}

#[derive(Clone)]
pub struct PreviewLoader {
    storage: Arc<dyn ILocalStorage>,
    layout: LocalLayout,
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl PreviewLoader {
    pub fn new(storage: Arc<dyn ILocalStorage>, layout: LocalLayout) -> Self {
        Self {
            storage,
            layout,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancels the load in progress, if any
    pub fn cancel(&self) {
        let slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }

    fn begin(&self) -> CancellationToken {
        let mut slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        token
    }

    /// Reads the local copy of `entry`
    pub async fn load(&self, entry: &FileEntry) -> PreviewOutcome {
        let token = self.begin();
        if !entry.can_load_data_local {
            return PreviewOutcome::Unreadable;
        }

        let path = self.layout.compose(entry);
        tokio::select! {
            _ = token.cancelled() => PreviewOutcome::Cancelled,
            result = self.storage.read_file(&path) => match result {
                Ok(data) => PreviewOutcome::Loaded(data),
                Err(e) if is_not_found(&e) => PreviewOutcome::Missing,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Preview unreadable");
                    PreviewOutcome::Unreadable
                }
            },
        }
    }
}
