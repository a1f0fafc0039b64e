//! Image inspector adapter
//!
//! Reads the EXIF block of JPEG and TIFF files for the capture date and the
//! embedded thumbnail, and renders thumbnails with the `image` crate when a
//! file has none.

use std::io::Cursor;

use anyhow::Context;
use chrono::NaiveDateTime;
use flashsync_core::ports::IImageInspector;
use image::{DynamicImage, ImageFormat};

/// Longest edge of generated thumbnails
pub const THUMBNAIL_SIZE: u32 = 160;

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_THUMBNAIL_OFFSET: u16 = 0x0201;
const TAG_THUMBNAIL_LENGTH: u16 = 0x0202;

// ============================================================================
// TIFF structure
// ============================================================================

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    /// Position of the 4-byte value/offset field
    field: usize,
}

struct Tiff<'a> {
    data: &'a [u8],
    little_endian: bool,
}

impl<'a> Tiff<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let little_endian = match data.get(..4)? {
            b"II*\0" => true,
            b"MM\0*" => false,
            _ => return None,
        };
        Some(Self {
            data,
            little_endian,
        })
    }

    fn u16_at(&self, pos: usize) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(pos..pos + 2)?.try_into().ok()?;
        Some(if self.little_endian {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        })
    }

    fn u32_at(&self, pos: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(pos..pos + 4)?.try_into().ok()?;
        Some(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    fn first_ifd(&self) -> Option<usize> {
        self.u32_at(4).map(|o| o as usize)
    }

    /// Entries of the IFD at `offset` and the offset of the next IFD
    fn ifd(&self, offset: usize) -> Option<(Vec<Entry>, usize)> {
        let count = self.u16_at(offset)? as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let pos = offset + 2 + i * 12;
            entries.push(Entry {
                tag: self.u16_at(pos)?,
                kind: self.u16_at(pos + 2)?,
                count: self.u32_at(pos + 4)?,
                field: pos + 8,
            });
        }
        let next = self.u32_at(offset + 2 + count * 12)? as usize;
        Some((entries, next))
    }

    fn number(&self, entry: &Entry) -> Option<usize> {
        match entry.kind {
            3 => self.u16_at(entry.field).map(usize::from),
            4 => self.u32_at(entry.field).map(|v| v as usize),
            _ => None,
        }
    }

    fn ascii(&self, entry: &Entry) -> Option<&'a str> {
        if entry.kind != 2 {
            return None;
        }
        let len = entry.count as usize;
        let start = if len <= 4 {
            entry.field
        } else {
            self.u32_at(entry.field)? as usize
        };
        let bytes = self.data.get(start..start.checked_add(len)?)?;
        std::str::from_utf8(bytes)
            .ok()
            .map(|s| s.trim_end_matches('\0').trim())
    }
}

fn find<'e>(entries: &'e [Entry], tag: u16) -> Option<&'e Entry> {
    entries.iter().find(|e| e.tag == tag)
}

// ============================================================================
// EXIF access
// ============================================================================

/// The TIFF structure holding EXIF data, from a JPEG APP1 segment or a
/// TIFF file itself
pub fn exif_block(data: &[u8]) -> Option<&[u8]> {
    if Tiff::parse(data).is_some() {
        return Some(data);
    }
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // End of image or start of scan: no metadata past this point
        if marker == 0xD9 || marker == 0xDA {
            return None;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let segment = data.get(pos + 4..pos + 2 + len)?;
        if marker == 0xE1 {
            if let Some(tiff) = segment.strip_prefix(b"Exif\0\0") {
                return Some(tiff);
            }
        }
        pos += 2 + len;
    }
    None
}

/// Capture date, falling back to the file's modification date tag
pub fn exif_date(data: &[u8]) -> Option<NaiveDateTime> {
    let tiff = Tiff::parse(exif_block(data)?)?;
    let (ifd0, _) = tiff.ifd(tiff.first_ifd()?)?;

    let original = find(&ifd0, TAG_EXIF_IFD)
        .and_then(|e| tiff.number(e))
        .and_then(|offset| tiff.ifd(offset))
        .and_then(|(exif, _)| {
            find(&exif, TAG_DATE_TIME_ORIGINAL).and_then(|e| tiff.ascii(e))
        });
    let text = original.or_else(|| find(&ifd0, TAG_DATE_TIME).and_then(|e| tiff.ascii(e)))?;

    NaiveDateTime::parse_from_str(text, "%Y:%m:%d %H:%M:%S").ok()
}

/// The JPEG thumbnail stored in IFD1
pub fn exif_thumbnail(data: &[u8]) -> Option<&[u8]> {
    let block = exif_block(data)?;
    let tiff = Tiff::parse(block)?;
    let (_, next) = tiff.ifd(tiff.first_ifd()?)?;
    if next == 0 {
        return None;
    }
    let (ifd1, _) = tiff.ifd(next)?;

    let offset = find(&ifd1, TAG_THUMBNAIL_OFFSET).and_then(|e| tiff.number(e))?;
    let length = find(&ifd1, TAG_THUMBNAIL_LENGTH).and_then(|e| tiff.number(e))?;
    if length == 0 {
        return None;
    }
    block.get(offset..offset.checked_add(length)?)
}

/// Decodes `data` and re-encodes it as a JPEG no larger than
/// [`THUMBNAIL_SIZE`] on either edge
pub fn render_thumbnail(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let image = image::load_from_memory(data).context("failed to decode image")?;
    let thumbnail = image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(thumbnail.to_rgb8())
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .context("failed to encode thumbnail")?;
    Ok(out)
}

// ============================================================================
// IImageInspector implementation
// ============================================================================

/// [`IImageInspector`] backed by the EXIF reader and the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageInspector;

#[async_trait::async_trait]
impl IImageInspector for ImageInspector {
    async fn read_exif_date(&self, data: &[u8]) -> Option<NaiveDateTime> {
        exif_date(data)
    }

    async fn read_exif_thumbnail(&self, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        exif_thumbnail(data)
            .map(<[u8]>::to_vec)
            .context("no EXIF thumbnail")
    }

    async fn create_thumbnail(&self, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || render_thumbnail(&data)).await?
    }
}
