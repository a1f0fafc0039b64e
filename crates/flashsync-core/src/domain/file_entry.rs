//! FileEntry domain entity
//!
//! A `FileEntry` is one image file seen in the card's listing, together
//! with everything the check/copy cycle learned about it.
//!
//! ## State Machine
//!
//! ```text
//!   ┌───────────┐  select   ┌────────────┐  start   ┌─────────┐  done   ┌────────┐
//!   │ NotCopied │ ────────► │ ToBeCopied │ ───────► │ Copying │ ──────► │ Copied │
//!   └───────────┘ ◄──────── └────────────┘ ◄─────── └─────────┘         └────────┘
//!         ▲        deselect                 failure      │                  │
//!         │                                              │ vanished         │ removed remotely,
//!         └──────────────────────────────────────────────┘                  │ local copy kept
//!                                                                           ▼
//!   any status ──── size mismatch ────► Weird                         ┌──────────┐
//!                                                                     │ Recycled │
//!                                                                     └──────────┘
//! ```
//!
//! ## Listing format
//!
//! The card answers `command.cgi?op=100` with one line per entry:
//! `DIR,NAME,SIZE,ATTR,DATE,TIME`, where DATE and TIME are FAT-packed
//! 16-bit integers.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Name of the card's vendor folder in the root directory
pub const SYSTEM_FOLDER_NAME: &str = "SD_WLAN";

/// Extensions the card may carry that count as images
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "tif", "tiff", "cr2", "cr3", "nef", "nrw", "arw", "orf", "raf",
    "rw2", "dng", "pef", "srw",
];

/// Extensions whose files carry EXIF metadata we can read
const EXIF_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff"];

/// Extensions the local image collaborator can decode
const DECODABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

// ============================================================================
// FileAttributes
// ============================================================================

/// FAT attribute bits as reported in the listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileAttributes(u16);

impl FileAttributes {
    pub const READ_ONLY: u16 = 0x01;
    pub const HIDDEN: u16 = 0x02;
    pub const SYSTEM: u16 = 0x04;
    pub const VOLUME: u16 = 0x08;
    pub const DIRECTORY: u16 = 0x10;
    pub const ARCHIVE: u16 = 0x20;

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    fn has(&self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.has(Self::READ_ONLY)
    }

    pub fn is_hidden(&self) -> bool {
        self.has(Self::HIDDEN)
    }

    pub fn is_system(&self) -> bool {
        self.has(Self::SYSTEM)
    }

    pub fn is_volume(&self) -> bool {
        self.has(Self::VOLUME)
    }

    pub fn is_directory(&self) -> bool {
        self.has(Self::DIRECTORY)
    }

    pub fn is_archive(&self) -> bool {
        self.has(Self::ARCHIVE)
    }
}

// ============================================================================
// FileStatus
// ============================================================================

/// Lifecycle status of a file entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Known on the card, no local copy
    #[default]
    NotCopied,
    /// Queued for the next copy phase
    ToBeCopied,
    /// Download in progress
    Copying,
    /// Local copy of matching size exists
    Copied,
    /// Download finished with a byte count different from the listing
    Weird,
    /// Deleted on the card, local copy moved to the recycle folder
    Recycled,
}

impl FileStatus {
    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            FileStatus::NotCopied => "NotCopied",
            FileStatus::ToBeCopied => "ToBeCopied",
            FileStatus::Copying => "Copying",
            FileStatus::Copied => "Copied",
            FileStatus::Weird => "Weird",
            FileStatus::Recycled => "Recycled",
        }
    }

    /// Whether moving from `self` to `target` is a legal transition
    pub fn can_transition_to(&self, target: FileStatus) -> bool {
        use FileStatus::*;

        match (self, target) {
            // Size mismatch can be detected from anywhere
            (_, Weird) => true,

            (NotCopied, ToBeCopied) => true,

            (ToBeCopied, NotCopied) => true,
            (ToBeCopied, Copying) => true,
            (ToBeCopied, Copied) => true,

            (Copying, Copied) => true,
            (Copying, ToBeCopied) => true,
            (Copying, NotCopied) => true,

            (Copied, Recycled) => true,
            (Copied, NotCopied) => true,

            _ => false,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// FAT timestamps
// ============================================================================

/// Timestamp used when the card reports an impossible FAT date
pub fn fat_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Decodes FAT-packed date and time words
pub fn decode_fat_timestamp(date: u16, time: u16) -> NaiveDateTime {
    let year = 1980 + i32::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0F);
    let day = u32::from(date & 0x1F);

    let hour = u32::from(time >> 11);
    let minute = u32::from((time >> 5) & 0x3F);
    let second = u32::from(time & 0x1F) * 2;

    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(d) => d
            .and_hms_opt(hour, minute, second)
            .or_else(|| d.and_hms_opt(0, 0, 0))
            .unwrap_or_else(fat_epoch),
        None => fat_epoch(),
    }
}

// ============================================================================
// FileEntry
// ============================================================================

/// One file on the card and its local counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    directory: String,
    file_name: String,
    size: u64,
    attributes: FileAttributes,
    fat_date: u16,
    fat_time: u16,
    date: NaiveDateTime,
    signature: String,
    status: FileStatus,

    /// Present in the latest remote listing
    pub is_alive_remote: bool,
    /// A local copy of matching size exists
    pub is_alive_local: bool,
    /// EXIF metadata can be read from this file type
    pub can_read_exif: bool,
    /// The local copy can be decoded for a thumbnail
    pub can_load_data_local: bool,
    /// The card may still serve a thumbnail for this file
    pub can_get_thumbnail_remote: bool,
    /// Thumbnail bytes, once obtained
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
    /// When the local copy was written
    pub copied_time: Option<DateTime<Local>>,
}

impl FileEntry {
    /// Creates an entry from already-parsed listing fields.
    ///
    /// `directory` is normalized to have no trailing slash, so the card's
    /// root is the empty string.
    pub fn new(
        directory: impl Into<String>,
        file_name: impl Into<String>,
        size: u64,
        attributes: u16,
        fat_date: u16,
        fat_time: u16,
    ) -> Result<Self, DomainError> {
        let directory = directory.into().trim_end_matches('/').to_string();
        let file_name = file_name.into();

        if file_name.is_empty() || file_name.contains('/') {
            return Err(DomainError::InvalidPath(format!("{directory}/{file_name}")));
        }

        Ok(Self::build(directory, file_name, size, attributes, fat_date, fat_time))
    }

    fn build(
        directory: String,
        file_name: String,
        size: u64,
        attributes: u16,
        fat_date: u16,
        fat_time: u16,
    ) -> Self {
        let date = decode_fat_timestamp(fat_date, fat_time);
        let signature = format!("{file_name}|{size}|{fat_date:04x}{fat_time:04x}");

        let mut entry = Self {
            directory,
            file_name,
            size,
            attributes: FileAttributes::from_bits(attributes),
            fat_date,
            fat_time,
            date,
            signature,
            status: FileStatus::NotCopied,
            is_alive_remote: true,
            is_alive_local: false,
            can_read_exif: false,
            can_load_data_local: false,
            can_get_thumbnail_remote: true,
            thumbnail: None,
            copied_time: None,
        };

        let ext = entry.extension();
        entry.can_read_exif = ext.as_deref().is_some_and(|e| EXIF_EXTENSIONS.contains(&e));
        entry.can_load_data_local = ext
            .as_deref()
            .is_some_and(|e| DECODABLE_EXTENSIONS.contains(&e));
        entry
    }

    /// Parses one listing line returned for `directory`.
    ///
    /// The numeric fields are split off from the right so that file names
    /// containing commas survive. When the line starts with the requested
    /// directory, everything after it is the file name.
    pub fn parse_listing_line(line: &str, directory: &str) -> Result<Self, DomainError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let invalid = || DomainError::InvalidListingLine(line.to_string());

        let mut fields = line.rsplitn(5, ',');
        let time = fields.next().ok_or_else(invalid)?;
        let date = fields.next().ok_or_else(invalid)?;
        let attributes = fields.next().ok_or_else(invalid)?;
        let size = fields.next().ok_or_else(invalid)?;
        let head = fields.next().ok_or_else(invalid)?;

        let time: u16 = time.trim().parse().map_err(|_| invalid())?;
        let date: u16 = date.trim().parse().map_err(|_| invalid())?;
        let attributes: u16 = attributes.trim().parse().map_err(|_| invalid())?;
        let size: u64 = size.trim().parse().map_err(|_| invalid())?;

        let requested = directory.trim_end_matches('/');
        let (dir, name) = match head
            .strip_prefix(requested)
            .and_then(|rest| rest.strip_prefix(','))
        {
            Some(name) => (requested, name),
            None => head.split_once(',').ok_or_else(invalid)?,
        };

        Self::new(dir, name, size, attributes, date, time).map_err(|_| invalid())
    }

    /// Placeholder entry used before the first real listing
    pub fn sample(index: usize) -> Self {
        Self::build("/DCIM".into(), format!("SAMPLE{index}.JPG"), 0, 0, 0, 0)
    }

    // --- identity ---

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Remote path, e.g. `/DCIM/100__TSB/IMG_0001.JPG`
    pub fn file_path(&self) -> String {
        format!("{}/{}", self.directory, self.file_name)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    /// Remote-reported timestamp (card-local time)
    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Lowercase extension without the dot
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }

    pub fn is_image_file(&self) -> bool {
        !self.is_directory()
            && self
                .extension()
                .as_deref()
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e))
    }

    /// The card's own configuration folder in the root directory
    pub fn is_system_folder(&self) -> bool {
        self.directory.is_empty()
            && self.is_directory()
            && self.file_name.eq_ignore_ascii_case(SYSTEM_FOLDER_NAME)
    }

    /// Placeholder entries have no size
    pub fn is_sample(&self) -> bool {
        self.size == 0
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail.is_some()
    }

    // --- status ---

    pub fn status(&self) -> FileStatus {
        self.status
    }

    /// Moves to `target`, rejecting transitions the lifecycle forbids
    pub fn transition_to(&mut self, target: FileStatus) -> Result<(), DomainError> {
        if self.status == target {
            return Ok(());
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Recomputes status from local presence after a listing merge
    pub fn refresh_local(&mut self, alive_local: bool) {
        self.is_alive_local = alive_local;
        self.status = if alive_local {
            FileStatus::Copied
        } else {
            FileStatus::NotCopied
        };
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes, {})", self.file_path(), self.size, self.status)
    }
}
