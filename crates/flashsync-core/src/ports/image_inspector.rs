//! Image inspection port
//!
//! Decoding images is not part of the sync engine. It needs exactly three
//! things from an image library: the EXIF capture date, the embedded EXIF
//! thumbnail, and a generated thumbnail for files without one.

use chrono::NaiveDateTime;

/// EXIF reader and thumbnail generator
#[async_trait::async_trait]
pub trait IImageInspector: Send + Sync {
    /// Capture date from EXIF metadata, if present and readable
    async fn read_exif_date(&self, data: &[u8]) -> Option<NaiveDateTime>;

    /// Thumbnail embedded in the EXIF metadata
    async fn read_exif_thumbnail(&self, data: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Thumbnail rendered from the full image
    async fn create_thumbnail(&self, data: &[u8]) -> anyhow::Result<Vec<u8>>;
}
