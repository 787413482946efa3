//! Image format detection from leading bytes.
//!
//! Attachments arrive as opaque buffers with no trustworthy type tag, so the
//! format is read from the magic numbers at the start of the data. Detection
//! never fails: [`ImageFormat::Unknown`] is a valid terminal answer and the
//! output policy maps it to PNG.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Recognised image container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Jpeg2000,
    Tiff,
    Gif,
    WebP,
    Heif,
    OpenExr,
    Unknown,
}

impl ImageFormat {
    /// MIME type used in data URIs and analyzer requests.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png | ImageFormat::Unknown => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Jpeg2000 => "image/jp2",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Heif => "image/heic",
            ImageFormat::OpenExr => "image/x-exr",
        }
    }

    /// File extension (without the dot) for exported files.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png | ImageFormat::Unknown => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Jpeg2000 => "jp2",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Heif => "heic",
            ImageFormat::OpenExr => "exr",
        }
    }

    /// The `image` crate codec for this format, when one is compiled in.
    pub(crate) fn codec(self) -> Option<image::ImageFormat> {
        match self {
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Tiff => Some(image::ImageFormat::Tiff),
            ImageFormat::Gif => Some(image::ImageFormat::Gif),
            ImageFormat::WebP => Some(image::ImageFormat::WebP),
            ImageFormat::Jpeg2000
            | ImageFormat::Heif
            | ImageFormat::OpenExr
            | ImageFormat::Unknown => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Jpeg2000 => "jpeg2000",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Heif => "heif",
            ImageFormat::OpenExr => "openexr",
            ImageFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const JPEG2000_MAGIC: &[u8] = &[0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20];
const TIFF_LE_MAGIC: &[u8] = &[0x49, 0x49, 0x2A, 0x00];
const TIFF_BE_MAGIC: &[u8] = &[0x4D, 0x4D, 0x00, 0x2A];
const GIF_MAGIC: &[u8] = b"GIF8";
const EXR_MAGIC: &[u8] = &[0x76, 0x2F, 0x31, 0x01];

/// Minimum number of bytes inspected before any verdict is given.
const MIN_SNIFF_LEN: usize = 8;

/// Detect an image's format from its leading bytes.
///
/// Inspects at most the first 12 bytes. Buffers shorter than 8 bytes are
/// always [`ImageFormat::Unknown`].
pub fn detect_format(data: &[u8]) -> ImageFormat {
    if data.len() < MIN_SNIFF_LEN {
        return ImageFormat::Unknown;
    }

    if data.starts_with(PNG_MAGIC) {
        ImageFormat::Png
    } else if data.starts_with(JPEG_MAGIC) {
        ImageFormat::Jpeg
    } else if data.starts_with(JPEG2000_MAGIC) {
        ImageFormat::Jpeg2000
    } else if data.starts_with(TIFF_LE_MAGIC) || data.starts_with(TIFF_BE_MAGIC) {
        ImageFormat::Tiff
    } else if data.starts_with(GIF_MAGIC) {
        ImageFormat::Gif
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP".as_slice()) {
        ImageFormat::WebP
    } else if data.get(4..8) == Some(b"ftyp".as_slice())
        && data.get(8..12) == Some(b"heic".as_slice())
    {
        ImageFormat::Heif
    } else if data.starts_with(EXR_MAGIC) {
        ImageFormat::OpenExr
    } else {
        ImageFormat::Unknown
    }
}

/// Output format policy: keep every recognised format, map unknown to PNG.
pub fn determine_output_format(original: ImageFormat) -> ImageFormat {
    match original {
        ImageFormat::Unknown => ImageFormat::Png,
        other => other,
    }
}
