//! Output types returned by the conversion entry points.
//!
//! The engine never writes files. A [`ProcessingResult`] carries everything an
//! output sink needs: the Markdown text, the exported images with their
//! relative paths, and a suggested file name for the Markdown itself.

use crate::error::ConversionWarning;
use crate::pipeline::image::ImageResult;
use serde::{Deserialize, Serialize};

/// What the output sink should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// A single Markdown file (images ignored or embedded as data URIs).
    MarkdownOnly,
    /// Markdown plus image files under their relative paths.
    BundleWithAssets,
    /// Nothing worth writing.
    None,
}

/// Result of one conversion.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Front matter (when configured) followed by the converted body.
    pub markdown: String,

    /// Exported images in document order. Only populated for folder export;
    /// every entry has `path` and `exportable_bytes` set.
    pub assets: Vec<ImageResult>,

    pub output_kind: OutputKind,

    /// File name for the Markdown, expanded from the configured template.
    pub suggested_filename: String,

    /// Non-fatal degradations, in the order they were found.
    pub warnings: Vec<ConversionWarning>,

    pub stats: ConversionStats,
}

impl ProcessingResult {
    /// `(relative path, bytes)` for every exported image.
    pub fn asset_files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.assets
            .iter()
            .filter_map(|a| Some((a.path.as_deref()?, a.exportable_bytes.as_deref()?)))
    }
}

/// Counters for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Lines in the source document.
    pub total_lines: usize,
    /// Image attachments seen (non-image attachments excluded).
    pub total_images: usize,
    /// Images rendered without degradation.
    pub images_converted: usize,
    /// Images rendered as a failure marker.
    pub images_failed: usize,
    /// Non-image attachments rendered as an opaque comment.
    pub attachments_skipped: usize,
    /// Tables recovered from the markup.
    pub tables: usize,
    /// Wall-clock time for the whole conversion.
    pub total_duration_ms: u64,
}
