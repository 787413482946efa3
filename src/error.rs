//! Error types for the clip2md library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`Clip2MdError`] — **Fatal**: the conversion cannot proceed at all
//!   (nothing to render, invalid configuration, malformed document JSON).
//!   Returned as `Err(Clip2MdError)` from the top-level `convert*` functions.
//!
//! * [`ConversionWarning`] — **Non-fatal**: a single image or table degraded
//!   (undecodable bytes, short table content) but the rest of the document is
//!   fine. Stored in [`crate::output::ProcessingResult::warnings`] so callers
//!   can inspect what was lost instead of losing the whole document.

use crate::pipeline::sniff::ImageFormat;
use thiserror::Error;

/// All fatal errors returned by the clip2md library.
///
/// Content anomalies use [`ConversionWarning`] and never surface here.
#[derive(Debug, Error)]
pub enum Clip2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document has no runs and no attachments.
    #[error("Document is empty: nothing to convert")]
    EmptyDocument,

    /// The serialised document could not be parsed.
    #[error("Invalid document: {detail}")]
    InvalidDocument { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Analyzer errors ───────────────────────────────────────────────────
    /// No LLM provider could be constructed for the alt-text analyzer.
    #[error("LLM provider '{provider}' not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal degradation recorded during conversion.
///
/// Image indices are the 1-based global image numbers used in file names.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionWarning {
    /// No byte source of the attachment yielded a decodable image.
    #[error("Image {index}: extraction failed: {detail}")]
    ImageExtractionFailed { index: usize, detail: String },

    /// The image decoded but could not be re-encoded, even as PNG.
    #[error("Image {index}: re-encoding to {format} failed: {detail}")]
    ImageReencodeFailed {
        index: usize,
        format: ImageFormat,
        detail: String,
    },

    /// The attachment is not an image; rendered as an opaque comment.
    #[error("Attachment at line {line} is not an image ({mime})")]
    UnsupportedAttachment { line: usize, mime: String },

    /// Fewer content tokens than table cells; padded with empty cells.
    #[error("Table {table}: found {found} of {expected} cells, padded with empty cells")]
    TableContentShortfall {
        table: usize,
        expected: usize,
        found: usize,
    },

    /// The table's text could not be found in the document; appended at the end.
    #[error("Table {table}: position not found, appended at the end of the document")]
    TablePositionUnknown { table: usize },

    /// An image sat on a line replaced by a table and was not rendered.
    #[error("Image on line {line} is inside table text and was dropped")]
    ImageInsideTable { line: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_display() {
        let msg = Clip2MdError::EmptyDocument.to_string();
        assert!(msg.contains("empty"), "got: {msg}");
    }

    #[test]
    fn reencode_failed_display() {
        let w = ConversionWarning::ImageReencodeFailed {
            index: 3,
            format: ImageFormat::Jpeg,
            detail: "encoder rejected buffer".into(),
        };
        let msg = w.to_string();
        assert!(msg.contains("Image 3"));
        assert!(msg.contains("jpeg"));
    }

    #[test]
    fn shortfall_display() {
        let w = ConversionWarning::TableContentShortfall {
            table: 0,
            expected: 6,
            found: 4,
        };
        assert!(w.to_string().contains("4 of 6"));
    }

    #[test]
    fn warning_serialises_to_json() {
        let w = ConversionWarning::UnsupportedAttachment {
            line: 2,
            mime: "application/pdf".into(),
        };
        let json = serde_json::to_string(&w).expect("serialise");
        assert!(json.contains("UnsupportedAttachment"));
    }
}
