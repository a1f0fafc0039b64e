//! Resilient GET primitive for the card
//!
//! The card is a small radio device behind a CGI interface. Responses can
//! stall forever once the access point goes away, declared lengths may be
//! missing, and the firmware answers transient overload with 400/401/500.
//! [`Transfer::download`] turns one GET into a byte vector under these rules:
//!
//! 1. Response headers must arrive within [`TransferPolicy::timeout`]. In
//!    parallel, a liveness monitor asks the [`INetworkProbe`] every
//!    [`TransferPolicy::monitor_interval`] whether the link is still up. A
//!    dead link fails as [`CardError::ConnectionLost`], a silent wait as
//!    [`CardError::Timeout`].
//! 2. 200 proceeds. 400, 401 and 500 fail as [`CardError::ConnectionUnable`],
//!    404 as [`CardError::RemoteFileNotFound`], anything else as
//!    [`CardError::UnexpectedStatus`].
//! 3. With an expected size, a missing or different `Content-Length` fails
//!    as [`CardError::RemoteFileInvalid`] before the body is read.
//! 4. Without a progress sink the body is read in one piece, raced against
//!    the same timeout and monitor. With one, the body is read in
//!    [`TransferPolicy::buffer_size`] chunks; each chunk gets a fresh timeout
//!    and monitor, so only stalls count. Progress is reported at least
//!    six times, more often for files above 3 MiB (every 512 KiB step).
//!    An early end of stream or surplus bytes fail as invalid.
//! 5. Cancelling the token drops the in-flight request future, which closes
//!    the connection, and yields [`CardError::Cancelled`].
//! 6. Only [`CardError::ConnectionUnable`] is retried, up to
//!    [`TransferPolicy::max_attempts`], with [`TransferPolicy::retry_delay`]
//!    between attempts. The delay is cancellable too.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let transfer = Transfer::new(TransferPolicy::default(), probe)?;
//! let request = DownloadRequest::new("http://flashair/DCIM/A.JPG")
//!     .expected_size(2048)
//!     .progress(&|p| println!("{} / {}", p.bytes_transferred, p.total_bytes));
//! let bytes = transfer.download(&request, &cancel).await?;
//! ```

use std::{sync::Arc, time::Duration};

use flashsync_core::{
    config::TransferConfig,
    domain::CardIdentity,
    ports::{INetworkProbe, ProgressInfo, ProgressSink},
};
use futures_util::TryStreamExt;
use reqwest::{header::CONTENT_LENGTH, Client, Response, StatusCode};
use tokio::{io::AsyncReadExt, time::Instant};
use tokio_util::{io::StreamReader, sync::CancellationToken};
use tracing::{debug, warn};

use crate::CardError;

/// Progress step for large files
const PROGRESS_STEP_BYTES: u64 = 512 * 1024;

/// Minimum number of progress reports per sized download
const MIN_PROGRESS_STEPS: u64 = 6;

// ============================================================================
// TransferPolicy
// ============================================================================

/// Timing and retry parameters of the transfer primitive
#[derive(Debug, Clone)]
pub struct TransferPolicy {
    /// Header timeout, and body timeout per read
    pub timeout: Duration,
    /// Period of link liveness checks
    pub monitor_interval: Duration,
    /// Total attempts for "connection unable" failures
    pub max_attempts: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Read buffer for sized downloads
    pub buffer_size: usize,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for TransferPolicy {
    fn from(config: &TransferConfig) -> Self {
        Self {
            timeout: config.timeout(),
            monitor_interval: config.monitor_interval(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            buffer_size: config.buffer_size.max(1),
        }
    }
}

// ============================================================================
// DownloadRequest
// ============================================================================

/// One GET to run through [`Transfer::download`]
#[derive(Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    /// Size from the listing; `None` or 0 skips length checks
    pub expected_size: Option<u64>,
    pub progress: Option<&'a dyn ProgressSink>,
    /// Card used for liveness checks, if known
    pub card: Option<&'a CardIdentity>,
}

impl<'a> DownloadRequest<'a> {
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            expected_size: None,
            progress: None,
            card: None,
        }
    }

    pub fn expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn card(mut self, card: Option<&'a CardIdentity>) -> Self {
        self.card = card;
        self
    }
}

// ============================================================================
// Transfer
// ============================================================================

/// The resilient GET primitive
pub struct Transfer {
    http: Client,
    policy: TransferPolicy,
    probe: Arc<dyn INetworkProbe>,
}

impl Transfer {
    /// Creates a transfer with its own HTTP client.
    ///
    /// The client carries no timeouts of its own; all timing is done here.
    pub fn new(policy: TransferPolicy, probe: Arc<dyn INetworkProbe>) -> Result<Self, CardError> {
        let http = Client::builder()
            .build()
            .map_err(|e| CardError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            policy,
            probe,
        })
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    /// Runs `request`, retrying "connection unable" failures
    #[tracing::instrument(skip(self, request, cancel), fields(url = %request.url))]
    pub async fn download(
        &self,
        request: &DownloadRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, CardError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(request, cancel).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "Card request failed, retrying"
                    );
                }
                Err(err) => return Err(err),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(CardError::Cancelled),
                _ = tokio::time::sleep(self.policy.retry_delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        request: &DownloadRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, CardError> {
        let send = self.http.get(request.url).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CardError::Cancelled),
            _ = self.watch_link(request.card) => return Err(CardError::ConnectionLost),
            result = tokio::time::timeout(self.policy.timeout, send) => match result {
                Err(_) => return Err(CardError::Timeout("response headers")),
                Ok(Err(e)) => return Err(classify_send_error(&e)),
                Ok(Ok(response)) => response,
            },
        };
        let started = Instant::now();

        check_status(response.status(), request.url)?;

        let expected = request.expected_size.filter(|size| *size > 0);
        if let Some(size) = expected {
            let declared = declared_length(&response);
            if declared != Some(size) {
                return Err(CardError::RemoteFileInvalid(format!(
                    "{}: expected {size} bytes, declared {declared:?}",
                    request.url
                )));
            }
        }

        match (expected, request.progress) {
            (Some(size), Some(sink)) => {
                self.read_chunked(response, size, sink, started, request, cancel)
                    .await
            }
            _ => self.read_whole(response, expected, request, cancel).await,
        }
    }

    async fn read_whole(
        &self,
        response: Response,
        expected: Option<u64>,
        request: &DownloadRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, CardError> {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CardError::Cancelled),
            _ = self.watch_link(request.card) => return Err(CardError::ConnectionLost),
            _ = tokio::time::sleep(self.policy.timeout) => {
                return Err(CardError::Timeout("response body"))
            }
            result = response.bytes() => {
                result.map_err(|e| classify_body_error(&e, request.url))?
            }
        };

        if let Some(size) = expected {
            if body.len() as u64 != size {
                return Err(CardError::RemoteFileInvalid(format!(
                    "{}: expected {size} bytes, received {}",
                    request.url,
                    body.len()
                )));
            }
        }

        debug!(bytes = body.len(), "Body received");
        Ok(body.to_vec())
    }

    async fn read_chunked(
        &self,
        response: Response,
        size: u64,
        sink: &dyn ProgressSink,
        started: Instant,
        request: &DownloadRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, CardError> {
        let stream = response.bytes_stream().map_err(|e| {
            if is_truncated_body(&e) {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e)
            } else {
                std::io::Error::other(e)
            }
        });
        let mut reader = StreamReader::new(Box::pin(stream));

        let mut buffer = vec![0u8; self.policy.buffer_size];
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        let mut steps = ProgressSteps::new(size);

        while (data.len() as u64) < size {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CardError::Cancelled),
                _ = self.watch_link(request.card) => return Err(CardError::ConnectionLost),
                _ = tokio::time::sleep(self.policy.timeout) => {
                    return Err(CardError::Timeout("response body"))
                }
                result = reader.read(&mut buffer) => match result {
                    Ok(read) => read,
                    // Handled below as an early end of stream
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => 0,
                    Err(e) => {
                        debug!(error = %e, "Body read failed");
                        return Err(CardError::ConnectionLost);
                    }
                },
            };

            let total = data.len() as u64 + read as u64;
            if read == 0 {
                return Err(CardError::RemoteFileInvalid(format!(
                    "{}: stream ended after {} of {size} bytes",
                    request.url,
                    data.len()
                )));
            }
            if total > size {
                return Err(CardError::RemoteFileInvalid(format!(
                    "{}: received more than {size} bytes",
                    request.url
                )));
            }

            data.extend_from_slice(&buffer[..read]);
            steps.advance(total, started.elapsed(), sink);
        }

        Ok(data)
    }

    /// Resolves once the probe reports the link down
    async fn watch_link(&self, card: Option<&CardIdentity>) {
        loop {
            tokio::time::sleep(self.policy.monitor_interval).await;
            if !self.probe.is_link_up(card).await {
                warn!("Card link is down");
                return;
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Progress thresholds of a sized download
#[derive(Debug)]
struct ProgressSteps {
    size: u64,
    total_steps: u64,
    next_step: u64,
}

impl ProgressSteps {
    fn new(size: u64) -> Self {
        Self {
            size,
            total_steps: size.div_ceil(PROGRESS_STEP_BYTES).max(MIN_PROGRESS_STEPS),
            next_step: 1,
        }
    }

    fn threshold(&self) -> u64 {
        (u128::from(self.size) * u128::from(self.next_step) / u128::from(self.total_steps)) as u64
    }

    /// Reports once for every threshold crossed by `transferred`
    fn advance(&mut self, transferred: u64, elapsed: Duration, sink: &dyn ProgressSink) {
        while self.next_step <= self.total_steps && self.threshold() <= transferred {
            sink.report(ProgressInfo {
                bytes_transferred: transferred,
                total_bytes: self.size,
                elapsed,
            });
            self.next_step += 1;
        }
    }
}

fn check_status(status: StatusCode, url: &str) -> Result<(), CardError> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::INTERNAL_SERVER_ERROR => {
            Err(CardError::ConnectionUnable {
                status: Some(status.as_u16()),
                reason: format!("card answered {status}"),
            })
        }
        StatusCode::NOT_FOUND => Err(CardError::RemoteFileNotFound(url.to_string())),
        other => Err(CardError::UnexpectedStatus {
            status: other.as_u16(),
            url: url.to_string(),
        }),
    }
}

fn declared_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn classify_send_error(err: &reqwest::Error) -> CardError {
    if err.is_timeout() {
        CardError::Timeout("response headers")
    } else {
        CardError::ConnectionUnable {
            status: None,
            reason: err.to_string(),
        }
    }
}

fn classify_body_error(err: &reqwest::Error, url: &str) -> CardError {
    if err.is_timeout() {
        CardError::Timeout("response body")
    } else if is_truncated_body(err) {
        CardError::RemoteFileInvalid(format!("{url}: stream ended before declared length"))
    } else {
        debug!(error = %err, "Body read failed");
        CardError::ConnectionLost
    }
}

/// Whether the body closed cleanly before its declared `Content-Length`.
///
/// The HTTP stack reports this as an `UnexpectedEof` I/O error somewhere in
/// the source chain; a reset connection carries a different kind.
fn is_truncated_body(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
