//! Identity and capabilities of the card answering on the remote root
//!
//! The firmware version string decides which CGI commands the card
//! understands. CID and SSID, together with the firmware version, are used
//! to notice that a different physical card was inserted between two checks.
//!
//! Change tracking is per field: each setter records whether the new value
//! differs from the previous one. [`CardIdentity::is_changed`] must only be
//! consulted after firmware, CID and SSID were set in that order, because
//! CID support itself depends on the firmware value.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
};

use regex::Regex;

/// Number of thumbnail failures after which remote thumbnails are no longer
/// requested from the card.
pub const THUMBNAIL_FAILURE_LIMIT: usize = 3;

// ============================================================================
// FirmwareVersion
// ============================================================================

/// Three-component firmware version, e.g. `2.00.02`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    /// First firmware answering `op=120` (CID)
    pub const CID_SINCE: Self = Self::new(1, 0, 3);
    /// First firmware answering `op=121` (write timestamp) and `op=118` (upload)
    pub const WRITE_TIMESTAMP_SINCE: Self = Self::new(2, 0, 2);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extracts the version from the tail of a firmware string such as
    /// `FlashAir 3.00.01`. Returns `None` when the pattern does not match.
    pub fn parse(firmware: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"([1-9])\.(\d{2})\.(\d{2})$").expect("firmware pattern is valid")
        });

        let caps = pattern.captures(firmware.trim_end())?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}.{:02}", self.major, self.minor, self.patch)
    }
}

// ============================================================================
// CardIdentity
// ============================================================================

/// Identity, capabilities and per-session bookkeeping for one card
#[derive(Debug, Clone, Default)]
pub struct CardIdentity {
    firmware_version: Option<String>,
    version: Option<FirmwareVersion>,
    firmware_changed: bool,

    cid: Option<String>,
    cid_changed: bool,

    ssid: Option<String>,
    ssid_changed: bool,

    /// Shared so that a background SSID verification can publish its result
    wireless_connected: Arc<AtomicBool>,

    write_timestamp: Option<i64>,
    upload_params: String,
    thumbnail_failures: Vec<String>,
}

impl CardIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    // --- firmware ---

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    pub fn version(&self) -> Option<FirmwareVersion> {
        self.version
    }

    pub fn set_firmware_version(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.firmware_changed = self.firmware_version.as_deref() != Some(value.as_str());
        if self.firmware_changed {
            self.version = FirmwareVersion::parse(&value);
            self.firmware_version = Some(value);
        }
    }

    pub fn supports_cid(&self) -> bool {
        self.version
            .is_some_and(|v| v >= FirmwareVersion::CID_SINCE)
    }

    pub fn supports_write_timestamp(&self) -> bool {
        self.version
            .is_some_and(|v| v >= FirmwareVersion::WRITE_TIMESTAMP_SINCE)
    }

    pub fn supports_upload(&self) -> bool {
        self.supports_write_timestamp()
    }

    // --- cid ---

    pub fn cid(&self) -> Option<&str> {
        self.cid.as_deref()
    }

    pub fn set_cid(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.cid_changed = self.cid.as_deref() != Some(value.as_str());
        if self.cid_changed {
            self.cid = Some(value);
        }
    }

    // --- ssid ---

    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn set_ssid(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.ssid_changed = self.ssid.as_deref() != Some(value.as_str());
        if self.ssid_changed {
            self.ssid = Some(value);
        }
    }

    /// Whether the card looks like a different physical card than last time.
    ///
    /// `Some(true)` if firmware or SSID changed. Otherwise the CID change flag
    /// when the firmware supports CID, and `None` when that cannot be told.
    pub fn is_changed(&self) -> Option<bool> {
        if self.firmware_changed || self.ssid_changed {
            return Some(true);
        }
        if self.supports_cid() {
            Some(self.cid_changed)
        } else {
            None
        }
    }

    // --- wireless link ---

    pub fn is_wireless_connected(&self) -> bool {
        self.wireless_connected.load(Ordering::Acquire)
    }

    pub fn set_wireless_connected(&self, connected: bool) {
        self.wireless_connected.store(connected, Ordering::Release);
    }

    /// Handle for publishing the wireless state from another task
    pub fn wireless_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.wireless_connected)
    }

    // --- write timestamp ---

    pub fn write_timestamp(&self) -> Option<i64> {
        self.write_timestamp
    }

    pub fn set_write_timestamp(&mut self, value: i64) {
        self.write_timestamp = Some(value);
    }

    // --- upload ---

    pub fn upload_params(&self) -> &str {
        &self.upload_params
    }

    pub fn set_upload_params(&mut self, value: impl Into<String>) {
        self.upload_params = value.into();
    }

    /// Whether uploading (and therefore `upload.cgi?DEL=`) is disabled.
    ///
    /// A firmware without upload support or a blank answer cannot be told
    /// apart from an enabled card, so both count as enabled.
    pub fn is_upload_disabled(&self) -> bool {
        if !self.supports_upload() || self.upload_params.trim().is_empty() {
            return false;
        }
        self.upload_params.trim() != "1"
    }

    // --- thumbnails ---

    /// Records a path whose remote thumbnail could not be obtained
    pub fn record_thumbnail_failure(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.thumbnail_failures.contains(&path) {
            self.thumbnail_failures.push(path);
        }
    }

    pub fn thumbnail_failures(&self) -> &[String] {
        &self.thumbnail_failures
    }

    /// Remote thumbnails are requested until the failure budget is spent
    pub fn can_get_thumbnail(&self) -> bool {
        self.thumbnail_failures.len() < THUMBNAIL_FAILURE_LIMIT
    }
}
