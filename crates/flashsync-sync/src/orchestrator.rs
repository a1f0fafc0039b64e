//! Check and copy orchestration
//!
//! The [`SyncOrchestrator`] owns the catalog and the card identity and runs
//! the two phases of a sync against a [`CardClient`].
//!
//! ## Phases
//!
//! 1. **Check**: read the card identity, list the card, merge the listing
//!    into the catalog, recycle local copies of deleted files, then fill
//!    thumbnails (local copies first, then the card's own thumbnails)
//! 2. **Copy**: confirm the card is unchanged, then download every
//!    `ToBeCopied` entry into the dated local layout, optionally deleting
//!    it from the card afterwards
//!
//! Every run ends in exactly one [`OperationStatus`]. Known failures
//! (connection, timeout, permission, card change) become a status and the
//! entry point returns `Ok(false)`; anything else is logged and propagated.
//!
//! ## Stopping
//!
//! A [`StopHandle`] is cloned out before a run and can be used from any task.
//! Stopping cancels the token the active run was started with; the run
//! unwinds at its next suspension point and reports `Stopped`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flashsync_card::{CardClient, CardError};
use flashsync_core::config::Config;
use flashsync_core::domain::{CardIdentity, DomainError, FileStatus, TargetFilter};
use flashsync_core::ports::{
    FileTimes, IImageInspector, ILocalStorage, INetworkProbe, ProgressInfo, ProgressSink,
};

use crate::catalog::{entry_order, FileCatalog};
use crate::events::{OperationStatus, OrchestratorState, SyncEvent};
use crate::layout::LocalLayout;
use crate::preview::{PreviewLoader, PreviewOutcome};
use crate::{is_not_found, SyncError};

// ============================================================================
// StopHandle
// ============================================================================

type TokenSlot = Arc<Mutex<Option<CancellationToken>>>;

fn lock(slot: &TokenSlot) -> MutexGuard<'_, Option<CancellationToken>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stops the active run and the auto-check loop from another task
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    working: TokenSlot,
    auto: TokenSlot,
}

impl StopHandle {
    /// Stops the auto-check loop and the active run
    pub fn stop(&self) {
        Self::cancel(&self.auto);
        Self::cancel(&self.working);
    }

    /// Stops only the active run; the auto-check loop keeps ticking
    pub fn stop_work(&self) {
        Self::cancel(&self.working);
    }

    pub fn is_working(&self) -> bool {
        lock(&self.working).is_some()
    }

    fn cancel(slot: &TokenSlot) {
        if let Some(token) = lock(slot).as_ref() {
            token.cancel();
        }
    }

    /// Opens the work scope of one entry point.
    ///
    /// While the auto-check loop runs, the scope is a child of its token, so
    /// a `stop()` between ticks still reaches the next run.
    pub(crate) fn begin_work(&self) -> CancellationToken {
        let token = match lock(&self.auto).as_ref() {
            Some(auto) => auto.child_token(),
            None => CancellationToken::new(),
        };
        *lock(&self.working) = Some(token.clone());
        token
    }

    pub(crate) fn end_work(&self) {
        lock(&self.working).take();
    }

    pub(crate) fn begin_auto(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock(&self.auto) = Some(token.clone());
        token
    }

    pub(crate) fn end_auto(&self) {
        lock(&self.auto).take();
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Runs checks and copies against one card
pub struct SyncOrchestrator {
    client: Arc<CardClient>,
    storage: Arc<dyn ILocalStorage>,
    images: Arc<dyn IImageInspector>,
    probe: Arc<dyn INetworkProbe>,

    layout: LocalLayout,
    filter: TargetFilter,
    delete_upon_copy: bool,
    moves_file_to_recycle: bool,
    instant_copy: bool,
    full_check_threshold: Duration,

    catalog: FileCatalog,
    card: CardIdentity,

    is_checking: bool,
    is_copying: bool,
    is_auto_running: bool,

    stop: StopHandle,
    events: mpsc::UnboundedSender<SyncEvent>,

    /// When the last check-and-copy left nothing to copy
    last_check_copy: Option<Instant>,
    thumbnails_filled: bool,
    copied_count: usize,
}

impl SyncOrchestrator {
    /// Creates an orchestrator and the receiver of its events
    pub fn new(
        config: &Config,
        client: Arc<CardClient>,
        storage: Arc<dyn ILocalStorage>,
        images: Arc<dyn IImageInspector>,
        probe: Arc<dyn INetworkProbe>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        let orchestrator = Self {
            client,
            storage,
            images,
            probe,
            layout: LocalLayout::from_config(&config.sync),
            filter: config.sync.target_filter(),
            delete_upon_copy: config.sync.delete_upon_copy,
            moves_file_to_recycle: config.sync.moves_file_to_recycle,
            instant_copy: config.sync.instant_copy,
            full_check_threshold: config.auto_check.full_check_threshold(),
            catalog: FileCatalog::new(),
            card: CardIdentity::new(),
            is_checking: false,
            is_copying: false,
            is_auto_running: false,
            stop: StopHandle::default(),
            events,
            last_check_copy: None,
            thumbnails_filled: false,
            copied_count: 0,
        };

        (orchestrator, receiver)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut FileCatalog {
        &mut self.catalog
    }

    pub fn card(&self) -> &CardIdentity {
        &self.card
    }

    pub fn filter(&self) -> &TargetFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: TargetFilter) {
        self.filter = filter;
    }

    pub fn state(&self) -> OrchestratorState {
        OrchestratorState::from_flags(self.is_checking, self.is_copying, self.is_auto_running)
    }

    pub fn is_busy(&self) -> bool {
        self.is_checking || self.is_copying
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn last_check_copy(&self) -> Option<Instant> {
        self.last_check_copy
    }

    pub fn thumbnails_filled(&self) -> bool {
        self.thumbnails_filled
    }

    /// Recomputes whether the target entries all have their thumbnails
    pub fn refresh_thumbnails_filled(&mut self) {
        self.thumbnails_filled = self.catalog.thumbnails_filled(&self.filter);
    }

    /// Forgets everything known about the card
    pub fn reset_card(&mut self) {
        self.card = CardIdentity::new();
        self.last_check_copy = None;
    }

    pub(crate) fn set_auto_running(&mut self, running: bool) {
        self.is_auto_running = running;
        self.publish_state();
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    fn emit(&self, event: SyncEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn set_status(&self, status: OperationStatus) {
        debug!(%status, "Status");
        self.emit(SyncEvent::Status(status));
    }

    fn publish_state(&self) {
        self.emit(SyncEvent::State(self.state()));
    }

    fn entry_changed(&self, path: &str) {
        if let Some(entry) = self.catalog.get(path) {
            self.emit(SyncEvent::EntryChanged {
                path: path.to_string(),
                status: entry.status(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    async fn is_ready(&self) -> bool {
        if !self.probe.is_network_available().await {
            self.set_status(OperationStatus::NoNetwork);
            return false;
        }
        if !self.filter.is_usable() {
            self.set_status(OperationStatus::NoTargetDates);
            return false;
        }
        true
    }

    /// Turns the result of a run into its final status.
    ///
    /// Returns `Ok(false)` for a stop or a failure with a dedicated status.
    fn settle(&self, result: Result<(), SyncError>, operation: &str) -> Result<bool, SyncError> {
        match result {
            Ok(()) => Ok(true),
            Err(err) if err.is_cancelled() => {
                info!(operation, "Stopped");
                self.set_status(OperationStatus::Stopped);
                Ok(false)
            }
            Err(err) if err.is_unexpected() => {
                error!(operation, error = %err, "Unexpected failure");
                self.set_status(OperationStatus::Error);
                Err(err)
            }
            Err(err) => {
                warn!(operation, error = %err, "Run failed");
                self.set_status(err.status());
                Ok(false)
            }
        }
    }

    /// Checks the card and copies every new target file.
    ///
    /// `Ok(true)` when the run completed or could not start for lack of
    /// network or target dates.
    #[tracing::instrument(skip(self))]
    pub async fn check_copy_files(&mut self) -> Result<bool, SyncError> {
        let token = self.stop.begin_work();
        if !self.is_ready().await {
            self.stop.end_work();
            return Ok(true);
        }

        self.is_checking = true;
        self.is_copying = true;
        self.publish_state();

        let result = self.check_copy_base(&token).await;

        self.stop.end_work();
        self.is_checking = false;
        self.is_copying = false;
        self.publish_state();

        self.settle(result, "check_copy")
    }

    async fn check_copy_base(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        self.run_check(token).await?;

        let has_work = self.catalog.mark_to_be_copied(&self.filter, true);
        self.last_check_copy = if has_work { None } else { Some(Instant::now()) };

        self.run_copy(token).await?;
        self.last_check_copy = Some(Instant::now());
        Ok(())
    }

    /// Checks the card without copying. New files stay `NotCopied` for the
    /// user to select.
    #[tracing::instrument(skip(self))]
    pub async fn check_files(&mut self) -> Result<bool, SyncError> {
        let token = self.stop.begin_work();
        if !self.is_ready().await {
            self.stop.end_work();
            return Ok(true);
        }

        self.is_checking = true;
        self.publish_state();

        let result = self.run_check(&token).await;
        self.stop.end_work();
        if result.is_ok() {
            let has_work = self.catalog.mark_to_be_copied(&self.filter, false);
            debug!(has_work, "Check finished");
        }

        self.is_checking = false;
        self.publish_state();

        self.settle(result, "check")
    }

    /// Copies the entries already marked `ToBeCopied`
    #[tracing::instrument(skip(self))]
    pub async fn copy_files(&mut self) -> Result<bool, SyncError> {
        let token = self.stop.begin_work();
        if !self.is_ready().await {
            self.stop.end_work();
            return Ok(true);
        }

        self.is_copying = true;
        self.publish_state();

        let result = self.run_copy(&token).await;
        self.stop.end_work();

        self.is_copying = false;
        self.publish_state();

        self.settle(result, "copy")
    }

    /// Cheap probe for new content on the card.
    ///
    /// `Some(true)` when the card reports a write since the last check,
    /// `Some(false)` when not (or the card is out of reach), `None` when the
    /// probe itself failed.
    #[tracing::instrument(skip(self))]
    pub async fn check_update(&mut self) -> Result<Option<bool>, SyncError> {
        let token = self.stop.begin_work();
        if !self.probe.is_link_up(Some(&self.card)).await {
            self.stop.end_work();
            self.set_status(OperationStatus::ConnectionUnable);
            return Ok(Some(false));
        }

        self.set_status(OperationStatus::Checking);
        let result = if token.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            self.probe_update(&token).await
        };
        self.stop.end_work();

        match result {
            Ok(updated) => {
                self.set_status(OperationStatus::Completed);
                Ok(Some(updated))
            }
            Err(err) => self.settle(Err(err), "check_update").map(|_| None),
        }
    }

    async fn probe_update(&self, token: &CancellationToken) -> Result<bool, SyncError> {
        if self.card.supports_write_timestamp() {
            let stamp = self.client.get_write_timestamp(token).await?;
            Ok(Some(stamp) != self.card.write_timestamp())
        } else {
            Ok(self.client.check_update_status(token).await?)
        }
    }

    /// One auto-check tick.
    ///
    /// A full check-and-copy runs unless thumbnails are complete and the
    /// last one is recent, in which case the cheap probe decides. Returns
    /// `Ok(false)` when the tick failed and the caller should back off.
    pub async fn execute_auto_check(&mut self) -> Result<bool, SyncError> {
        let recent = self
            .last_check_copy
            .is_some_and(|at| at.elapsed() < self.full_check_threshold);

        if self.thumbnails_filled && recent {
            match self.check_update().await? {
                None => return Ok(false),
                Some(false) => return Ok(true),
                Some(true) => debug!("Card reports new content"),
            }
        }

        let completed = self.check_copy_files().await?;
        if completed {
            self.thumbnails_filled = true;
        }
        Ok(completed)
    }

    /// Toggles the manual selection of `path`.
    ///
    /// With instant copy, selecting a file while idle copies it right away.
    pub async fn select_file(&mut self, path: &str) -> Result<Option<FileStatus>, SyncError> {
        let Some(status) = self.catalog.toggle(path) else {
            return Ok(None);
        };
        self.entry_changed(path);

        if status == FileStatus::ToBeCopied && self.instant_copy && !self.is_busy() {
            self.copy_files().await?;
        }
        Ok(Some(status))
    }

    /// A loader for local previews, independent of runs
    pub fn preview_loader(&self) -> PreviewLoader {
        PreviewLoader::new(Arc::clone(&self.storage), self.layout.clone())
    }

    /// Records what a preview load learned about the local copy
    pub fn apply_preview(&mut self, path: &str, outcome: &PreviewOutcome) {
        let Some(entry) = self.catalog.get_mut(path) else {
            return;
        };
        match outcome {
            PreviewOutcome::Missing => {
                entry.refresh_local(false);
                self.entry_changed(path);
            }
            PreviewOutcome::Unreadable => entry.can_load_data_local = false,
            PreviewOutcome::Loaded(_) | PreviewOutcome::Cancelled => {}
        }
    }

    // ------------------------------------------------------------------------
    // Check phase
    // ------------------------------------------------------------------------

    async fn run_check(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        self.set_status(OperationStatus::Checking);

        let result = self.check_base(token).await;

        self.emit(SyncEvent::Selection(None));
        result
    }

    async fn check_base(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        self.read_identity(token).await?;

        let mut listing = self
            .client
            .list_directory_recursive("/", Some(&self.card), token)
            .await?;
        listing.sort_by(entry_order);

        if self.card.supports_write_timestamp() {
            let stamp = self.client.get_write_timestamp(token).await?;
            self.card.set_write_timestamp(stamp);
        }

        let holds_samples = self.catalog.holds_samples();
        let changed = self
            .card
            .is_changed()
            .unwrap_or_else(|| !self.catalog.shares_signature(&listing));
        if holds_samples || changed {
            info!(holds_samples, changed, "Starting a fresh catalog");
            self.catalog.clear();
        }

        let candidates: Vec<(String, u64, PathBuf)> = self
            .catalog
            .iter()
            .chain(listing.iter())
            .map(|e| (e.file_path(), e.size(), self.layout.compose(e)))
            .collect();

        let mut copied = HashSet::new();
        for (path, size, local) in candidates {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if self.is_copied_local(&local, size).await? {
                copied.insert((path, size));
            }
        }

        let summary = self
            .catalog
            .merge(listing, |e| copied.contains(&(e.file_path(), e.size())));
        info!(
            added = summary.added.len(),
            kept = summary.kept,
            vanished = summary.vanished,
            "Merged card listing"
        );
        if let Some(first) = summary.added.first() {
            self.emit(SyncEvent::Selection(Some(first.clone())));
        }
        for path in &summary.added {
            self.entry_changed(path);
        }

        self.reconcile_deletions().await?;

        self.fill_local_thumbnails(token).await?;
        self.fill_remote_thumbnails(token).await?;

        self.set_status(OperationStatus::CheckCompleted);
        Ok(())
    }

    async fn read_identity(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        let firmware = self.client.get_firmware_version(token).await?;
        self.card.set_firmware_version(firmware);

        if self.card.supports_cid() {
            let cid = self.client.get_cid(token).await?;
            self.card.set_cid(cid);
        }

        let ssid = self.client.get_ssid(token).await?;
        if !ssid.trim().is_empty() {
            self.spawn_wireless_check(ssid.clone());
        }
        self.card.set_ssid(ssid);

        debug!(
            firmware = ?self.card.firmware_version(),
            cid = ?self.card.cid(),
            ssid = ?self.card.ssid(),
            "Card identity"
        );
        Ok(())
    }

    /// Finds out in the background whether the card is reached over its own
    /// network. Link monitoring reads the result once it lands.
    fn spawn_wireless_check(&self, ssid: String) {
        let probe = Arc::clone(&self.probe);
        let flag = self.card.wireless_flag();
        tokio::spawn(async move {
            let connected = probe.is_wireless_connected(&ssid).await;
            debug!(%ssid, connected, "Wireless network check");
            flag.store(connected, Ordering::Release);
        });
    }

    async fn reconcile_deletions(&mut self) -> Result<(), SyncError> {
        let outcome = self.catalog.reconcile_deletions(self.moves_file_to_recycle);

        if !outcome.removed.is_empty() {
            debug!(count = outcome.removed.len(), "Dropped entries gone from the card");
        }
        if outcome.recycled.is_empty() {
            return Ok(());
        }

        let paths: Vec<PathBuf> = outcome
            .recycled
            .iter()
            .filter_map(|p| self.catalog.get(p))
            .map(|e| self.layout.compose(e))
            .collect();
        let moved = self
            .storage
            .move_to_recycle(&paths)
            .await
            .map_err(|e| SyncError::from_storage(e, self.layout.root()))?;
        info!(count = moved.len(), "Moved local copies to the recycle folder");

        self.catalog.mark_recycled(&outcome.recycled);
        for path in &outcome.recycled {
            self.entry_changed(path);
        }
        Ok(())
    }

    async fn fill_local_thumbnails(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        let paths: Vec<String> = self
            .catalog
            .iter()
            .filter(|e| {
                self.filter.matches(e)
                    && !e.has_thumbnail()
                    && e.status() == FileStatus::Copied
                    && e.is_alive_local
                    && e.can_load_data_local
            })
            .map(|e| e.file_path())
            .collect();

        for path in paths {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let Some(entry) = self.catalog.get(&path) else {
                continue;
            };
            let local = self.layout.compose(entry);
            let can_read_exif = entry.can_read_exif;

            // (missing, error)
            let outcome = match self.storage.read_file(&local).await {
                Ok(data) => self
                    .make_thumbnail(&data, can_read_exif, true)
                    .await
                    .map_err(|e| (false, e)),
                Err(e) => Err((is_not_found(&e), e)),
            };

            let mut missing = false;
            if let Some(entry) = self.catalog.get_mut(&path) {
                match outcome {
                    Ok(thumbnail) => entry.thumbnail = Some(thumbnail),
                    Err((true, _)) => {
                        entry.refresh_local(false);
                        missing = true;
                    }
                    Err((false, e)) => {
                        debug!(%path, error = %e, "No thumbnail from the local copy");
                        entry.can_load_data_local = false;
                    }
                }
            }
            if missing {
                self.entry_changed(&path);
            }
        }
        Ok(())
    }

    async fn fill_remote_thumbnails(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        let paths: Vec<String> = self
            .catalog
            .iter()
            .filter(|e| {
                self.filter.matches(e)
                    && !e.has_thumbnail()
                    && e.status() != FileStatus::Copied
                    && e.is_alive_remote
                    && e.can_get_thumbnail_remote
            })
            .map(|e| e.file_path())
            .collect();

        for path in paths {
            if !self.card.can_get_thumbnail() {
                debug!("Remote thumbnail budget spent");
                break;
            }
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.client.get_thumbnail(&path, Some(&self.card), token).await {
                Ok(thumbnail) => {
                    if let Some(entry) = self.catalog.get_mut(&path) {
                        entry.thumbnail = Some(thumbnail);
                    }
                }
                Err(CardError::ThumbnailUnavailable(_)) => {
                    debug!(%path, "Card has no thumbnail");
                    if let Some(entry) = self.catalog.get_mut(&path) {
                        entry.can_get_thumbnail_remote = false;
                    }
                    self.card.record_thumbnail_failure(path);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Copy phase
    // ------------------------------------------------------------------------

    async fn run_copy(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        let started = Instant::now();
        self.copied_count = 0;

        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if !self.catalog.has_to_be_copied(&self.filter) {
            self.set_status(OperationStatus::NoFileToBeCopied);
            return Ok(());
        }

        self.set_status(OperationStatus::Copying);

        let result = self.copy_base(token).await;

        self.emit(SyncEvent::Selection(None));
        result?;

        let files = self.copied_count;
        let seconds = started.elapsed().as_secs();
        info!(files, seconds, "Copy completed");
        self.set_status(OperationStatus::CopyCompleted { files, seconds });
        Ok(())
    }

    async fn copy_base(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        if self.card.supports_cid() {
            let cid = self.client.get_cid(token).await?;
            if self.card.cid() != Some(cid.as_str()) {
                warn!(expected = ?self.card.cid(), found = %cid, "Card changed since the check");
                return Err(SyncError::CardChanged);
            }
        }

        if self.delete_upon_copy && self.card.supports_upload() {
            let params = self.client.get_upload_params(token).await?;
            self.card.set_upload_params(params);
            if self.card.is_upload_disabled() {
                return Err(SyncError::UploadDisabled);
            }
        }

        loop {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let Some(path) = self.catalog.next_to_be_copied(&self.filter) else {
                break;
            };

            let copied = match self.copy_entry(&path, token).await {
                Ok(()) => true,
                Err(SyncError::Card(CardError::RemoteFileNotFound(_))) => {
                    warn!(%path, "File is gone from the card");
                    if let Some(entry) = self.catalog.get_mut(&path) {
                        entry.is_alive_remote = false;
                        entry.transition_to(FileStatus::NotCopied)?;
                    }
                    false
                }
                Err(SyncError::Card(CardError::RemoteFileInvalid(reason))) => {
                    warn!(%path, %reason, "Downloaded size does not match the listing");
                    if let Some(entry) = self.catalog.get_mut(&path) {
                        entry.transition_to(FileStatus::Weird)?;
                    }
                    false
                }
                Err(err) => {
                    if let Some(entry) = self.catalog.get_mut(&path) {
                        if entry.status() == FileStatus::Copying {
                            entry.transition_to(FileStatus::ToBeCopied)?;
                        }
                    }
                    self.entry_changed(&path);
                    return Err(err);
                }
            };
            self.entry_changed(&path);

            if copied && self.delete_upon_copy {
                self.delete_copied(&path, token).await?;
            }
        }
        Ok(())
    }

    async fn copy_entry(&mut self, path: &str, token: &CancellationToken) -> Result<(), SyncError> {
        let entry = self
            .catalog
            .get_mut(path)
            .ok_or_else(|| DomainError::InvalidPath(path.to_string()))?;
        entry.transition_to(FileStatus::Copying)?;

        let size = entry.size();
        let date = entry.date();
        let can_read_exif = entry.can_read_exif;
        let can_load_data = entry.can_load_data_local;
        let has_thumbnail = entry.has_thumbnail();
        let local = self.layout.compose(entry);

        self.entry_changed(path);
        self.emit(SyncEvent::Selection(Some(path.to_string())));

        if let Some(dir) = local.parent() {
            self.storage
                .create_directory(dir)
                .await
                .map_err(|e| SyncError::from_storage(e, dir))?;
        }

        let events = self.events.clone();
        let sink = move |progress: ProgressInfo| {
            let _ = events.send(SyncEvent::Progress(progress));
        };
        let progress: &dyn ProgressSink = &sink;
        let data = self
            .client
            .download_file(path, size, Some(progress), Some(&self.card), token)
            .await?;

        self.storage
            .write_file(&local, &data)
            .await
            .map_err(|e| SyncError::from_storage(e, &local))?;

        let created = if can_read_exif {
            self.images.read_exif_date(&data).await.unwrap_or(date)
        } else {
            date
        };
        self.storage
            .set_times(&local, FileTimes { created, modified: date })
            .await
            .map_err(|e| SyncError::from_storage(e, &local))?;

        let thumbnail = if has_thumbnail {
            None
        } else {
            Some(self.make_thumbnail(&data, can_read_exif, can_load_data).await)
        };

        let entry = self
            .catalog
            .get_mut(path)
            .ok_or_else(|| DomainError::InvalidPath(path.to_string()))?;
        match thumbnail {
            Some(Ok(thumbnail)) => entry.thumbnail = Some(thumbnail),
            Some(Err(e)) => {
                debug!(%path, error = %e, "No thumbnail from the copied data");
                entry.can_load_data_local = false;
            }
            None => {}
        }
        entry.copied_time = Some(Local::now());
        entry.is_alive_local = true;
        entry.transition_to(FileStatus::Copied)?;
        self.copied_count += 1;

        info!(%path, bytes = data.len(), local = %local.display(), "Copied");
        Ok(())
    }

    /// Deletes `path` from the card once its local copy is confirmed
    async fn delete_copied(&mut self, path: &str, token: &CancellationToken) -> Result<(), SyncError> {
        let Some(entry) = self.catalog.get(path) else {
            return Ok(());
        };
        let local = self.layout.compose(entry);
        if !self.is_copied_local(&local, entry.size()).await? {
            warn!(%path, "Local copy not confirmed, keeping the file on the card");
            return Ok(());
        }

        self.client.delete_file(path, Some(&self.card), token).await?;
        info!(%path, "Deleted from the card");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn is_copied_local(&self, local: &Path, size: u64) -> Result<bool, SyncError> {
        let state = self
            .storage
            .get_state(local)
            .await
            .map_err(|e| SyncError::from_storage(e, local))?;
        Ok(state.is_file_of_size(size))
    }

    async fn make_thumbnail(
        &self,
        data: &[u8],
        can_read_exif: bool,
        can_load_data: bool,
    ) -> anyhow::Result<Vec<u8>> {
        if can_read_exif {
            self.images.read_exif_thumbnail(data).await
        } else if can_load_data {
            self.images.create_thumbnail(data).await
        } else {
            anyhow::bail!("no decoder for this file type")
        }
    }
}
