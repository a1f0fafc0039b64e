//! Typed card operations
//!
//! [`CardClient`] composes CGI URLs from the configured root and runs them
//! through the [`Transfer`] primitive. Text responses are decoded leniently
//! and interpreted here; every operation returns either a value or a
//! [`CardError`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = CardClient::new(&config, probe)?;
//! let files = client.list_directory_recursive("/DCIM", None, &cancel).await?;
//! for file in &files {
//!     let bytes = client
//!         .download_file(&file.file_path(), file.size(), None, None, &cancel)
//!         .await?;
//! }
//! ```

use std::{future::Future, pin::Pin, sync::Arc};

use anyhow::Context;
use flashsync_core::{
    config::{validate_remote_root, Config},
    domain::{CardIdentity, FileEntry},
    ports::{INetworkProbe, ProgressSink},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    command::CardCommand,
    transfer::{DownloadRequest, Transfer, TransferPolicy},
    CardError,
};

/// Body the card answers to a successful deletion
const DELETE_SUCCESS: &str = "SUCCESS";

type ListingFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<FileEntry>, CardError>> + Send + 'a>>;

// ============================================================================
// CardClient
// ============================================================================

/// Client for one card's CGI interface
pub struct CardClient {
    /// Remote root, always ending in `/`
    root: String,
    transfer: Transfer,
}

impl CardClient {
    /// Creates a client from the card and transfer sections of `config`
    pub fn new(config: &Config, probe: Arc<dyn INetworkProbe>) -> anyhow::Result<Self> {
        Self::with_policy(
            &config.card.remote_root,
            TransferPolicy::from(&config.transfer),
            probe,
        )
    }

    /// Creates a client with an explicit root and policy (useful for testing)
    pub fn with_policy(
        root: &str,
        policy: TransferPolicy,
        probe: Arc<dyn INetworkProbe>,
    ) -> anyhow::Result<Self> {
        validate_remote_root(root).context("invalid card root")?;
        let transfer = Transfer::new(policy, probe).context("failed to create transfer")?;
        Ok(Self {
            root: root.to_string(),
            transfer,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn url(&self, command: CardCommand, path: &str) -> String {
        command.url(&self.root, path)
    }

    async fn download_string(
        &self,
        command: CardCommand,
        path: &str,
        card: Option<&CardIdentity>,
        cancel: &CancellationToken,
    ) -> Result<String, CardError> {
        let url = self.url(command, path);
        let request = DownloadRequest::new(&url).card(card);
        let bytes = self.transfer.download(&request, cancel).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        trace!(?command, %url, response = %text, "Card response");
        Ok(text)
    }

    // ------------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------------

    /// Lists the entries of one remote directory.
    ///
    /// Lines that do not parse (the card's header line among them) are
    /// skipped.
    #[tracing::instrument(skip(self, card, cancel))]
    pub async fn list_directory(
        &self,
        path: &str,
        card: Option<&CardIdentity>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileEntry>, CardError> {
        let text = self
            .download_string(CardCommand::ListFiles, path, card, cancel)
            .await?;

        let entries: Vec<FileEntry> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match FileEntry::parse_listing_line(line, path) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping listing line");
                    None
                }
            })
            .collect();

        debug!(count = entries.len(), "Listed directory");
        Ok(entries)
    }

    /// Collects image files below `path`, descending into subdirectories.
    ///
    /// Hidden, system and volume entries are skipped, and so is the card's
    /// own configuration folder.
    pub fn list_directory_recursive<'a>(
        &'a self,
        path: &'a str,
        card: Option<&'a CardIdentity>,
        cancel: &'a CancellationToken,
    ) -> ListingFuture<'a> {
        Box::pin(async move {
            let mut files = Vec::new();

            for entry in self.list_directory(path, card, cancel).await? {
                let attributes = entry.attributes();
                if attributes.is_hidden()
                    || attributes.is_system()
                    || attributes.is_volume()
                    || entry.is_system_folder()
                {
                    continue;
                }

                if entry.is_directory() {
                    let child = entry.file_path();
                    let nested = self.list_directory_recursive(&child, card, cancel).await?;
                    files.extend(nested);
                } else if entry.is_image_file() {
                    files.push(entry);
                }
            }

            Ok(files)
        })
    }

    /// Number of files in `path`; 0 when the answer is not a number
    pub async fn count_files(
        &self,
        path: &str,
        card: Option<&CardIdentity>,
        cancel: &CancellationToken,
    ) -> Result<u64, CardError> {
        let text = self
            .download_string(CardCommand::CountFiles, path, card, cancel)
            .await?;
        Ok(text.trim().parse().unwrap_or(0))
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    /// Fetches the card-generated thumbnail of `path`
    pub async fn get_thumbnail(
        &self,
        path: &str,
        card: Option<&CardIdentity>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, CardError> {
        let url = self.url(CardCommand::GetThumbnail, path);
        let request = DownloadRequest::new(&url).card(card);

        match self.transfer.download(&request, cancel).await {
            Err(CardError::RemoteFileNotFound(_))
            | Err(CardError::ConnectionUnable {
                status: Some(500), ..
            }) => Err(CardError::ThumbnailUnavailable(path.to_string())),
            other => other,
        }
    }

    /// Downloads `path`, checking its length against `size` when nonzero
    #[tracing::instrument(skip(self, progress, card, cancel))]
    pub async fn download_file(
        &self,
        path: &str,
        size: u64,
        progress: Option<&dyn ProgressSink>,
        card: Option<&CardIdentity>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, CardError> {
        let url = self.url(CardCommand::Download, path);
        let mut request = DownloadRequest::new(&url).expected_size(size).card(card);
        request.progress = progress;

        self.transfer.download(&request, cancel).await
    }

    /// Deletes `path` through `upload.cgi`
    #[tracing::instrument(skip(self, card, cancel))]
    pub async fn delete_file(
        &self,
        path: &str,
        card: Option<&CardIdentity>,
        cancel: &CancellationToken,
    ) -> Result<(), CardError> {
        let text = match self
            .download_string(CardCommand::DeleteFile, path, card, cancel)
            .await
        {
            Err(CardError::RemoteFileNotFound(_)) => {
                return Err(CardError::DeletionFailed {
                    path: path.to_string(),
                    reason: "upload.cgi is disabled".into(),
                })
            }
            other => other?,
        };

        if text != DELETE_SUCCESS {
            return Err(CardError::DeletionFailed {
                path: path.to_string(),
                reason: text,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    pub async fn get_firmware_version(&self, cancel: &CancellationToken) -> Result<String, CardError> {
        let text = self
            .download_string(CardCommand::GetFirmwareVersion, "", None, cancel)
            .await?;
        Ok(text.trim().to_string())
    }

    /// Card identifier; empty when the firmware does not answer
    pub async fn get_cid(&self, cancel: &CancellationToken) -> Result<String, CardError> {
        match self
            .download_string(CardCommand::GetCid, "", None, cancel)
            .await
        {
            Ok(text) => Ok(text.trim().to_string()),
            Err(CardError::ConnectionUnable { .. }) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn get_ssid(&self, cancel: &CancellationToken) -> Result<String, CardError> {
        let text = self
            .download_string(CardCommand::GetSsid, "", None, cancel)
            .await?;
        Ok(text.trim().to_string())
    }

    /// Whether the card reports a change since the last query
    pub async fn check_update_status(&self, cancel: &CancellationToken) -> Result<bool, CardError> {
        let text = self
            .download_string(CardCommand::GetUpdateStatus, "", None, cancel)
            .await?;
        Ok(text.trim() == "1")
    }

    /// Write timestamp; -1 when unknown
    pub async fn get_write_timestamp(&self, cancel: &CancellationToken) -> Result<i64, CardError> {
        match self
            .download_string(CardCommand::GetWriteTimestamp, "", None, cancel)
            .await
        {
            Ok(text) => Ok(text.trim().parse().unwrap_or(-1)),
            Err(CardError::ConnectionUnable { .. }) => Ok(-1),
            Err(e) => Err(e),
        }
    }

    /// Raw upload parameters; empty when the firmware does not answer
    pub async fn get_upload_params(&self, cancel: &CancellationToken) -> Result<String, CardError> {
        match self
            .download_string(CardCommand::GetUploadParams, "", None, cancel)
            .await
        {
            Ok(text) => Ok(text.trim().to_string()),
            Err(CardError::ConnectionUnable { .. }) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for CardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardClient")
            .field("root", &self.root)
            .field("policy", self.transfer.policy())
            .finish()
    }
}
