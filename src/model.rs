//! The normalised rich document handed to the engine.
//!
//! A reader adapter (clipboard, share sheet, test fixture) flattens whatever
//! the platform gives it into an ordered list of [`Segment`]s: styled text
//! runs and inline attachments. Attributes are a closed, typed record rather
//! than a key/value dictionary so every renderer can pattern-match on them.
//!
//! The model is serde-serialisable; binary attachment payloads travel as
//! standard base64 strings in JSON.

use crate::error::Clip2MdError;
use serde::{Deserialize, Serialize};

/// Object replacement character standing in for an attachment in plain text.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Paragraph-level list marker formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Disc,
    Hyphen,
    Circle,
    Check,
    Decimal,
    LowerAlpha,
    UpperAlpha,
    LowerRoman,
    UpperRoman,
    /// A marker format the reader could not classify.
    Other,
}

/// Formatting and structural attributes of a text run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunAttributes {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    /// Link target, when the run is a hyperlink.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Font size in points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_marker: Option<MarkerKind>,
    /// List nesting depth; 1 is a top-level list item.
    pub indent_depth: u8,
    /// Identifier of the table-cell block this run belongs to, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_cell: Option<String>,
}

impl RunAttributes {
    pub fn is_plain(&self) -> bool {
        *self == RunAttributes::default()
    }
}

/// A contiguous span of text sharing one attribute set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledRun {
    pub text: String,
    #[serde(flatten)]
    pub attributes: RunAttributes,
}

impl StyledRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributes: RunAttributes::default(),
        }
    }

    pub fn styled(text: impl Into<String>, attributes: RunAttributes) -> Self {
        Self {
            text: text.into(),
            attributes,
        }
    }
}

/// A decoded bitmap surface (8-bit RGBA, row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedBitmap {
    pub width: u32,
    pub height: u32,
    #[serde(with = "base64_bytes")]
    pub rgba: Vec<u8>,
}

/// An inline object with several fallback byte accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    /// Raw content buffer.
    #[serde(with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<u8>>,
    /// Contents of a wrapped file.
    #[serde(with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub file_wrapper: Option<Vec<u8>>,
    /// Already-decoded bitmap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitmap: Option<DecodedBitmap>,
    /// Declared MIME type, when the reader knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Some(bytes.into()),
            ..Default::default()
        }
    }

    /// True when the declared type rules out an image.
    pub fn is_declared_non_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| !m.trim().to_ascii_lowercase().starts_with("image/"))
    }

    /// True when no accessor carries anything at all.
    pub fn is_empty(&self) -> bool {
        self.contents.as_ref().is_none_or(|b| b.is_empty())
            && self.file_wrapper.as_ref().is_none_or(|b| b.is_empty())
            && self.bitmap.is_none()
    }
}

/// One element of the flattened document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text(StyledRun),
    Attachment(Attachment),
}

/// An ordered sequence of styled runs and attachments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichDocument {
    pub segments: Vec<Segment>,
}

impl RichDocument {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse a document from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, Clip2MdError> {
        serde_json::from_str(json).map_err(|e| Clip2MdError::InvalidDocument {
            detail: e.to_string(),
        })
    }

    /// Append a text run.
    pub fn push_text(&mut self, text: impl Into<String>, attributes: RunAttributes) {
        self.segments
            .push(Segment::Text(StyledRun::styled(text, attributes)));
    }

    pub fn push_attachment(&mut self, attachment: Attachment) {
        self.segments.push(Segment::Attachment(attachment));
    }

    /// True when there are no attachments and no non-empty text runs.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| match s {
            Segment::Text(run) => run.text.is_empty(),
            Segment::Attachment(_) => false,
        })
    }

    /// Plain text with attachments shown as U+FFFC.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(run) => out.push_str(&run.text),
                Segment::Attachment(_) => out.push(OBJECT_REPLACEMENT),
            }
        }
        out
    }

    pub fn attachment_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Attachment(_)))
            .count()
    }

    /// Split the document at newlines.
    ///
    /// Always yields `plain_text().split('\n').count()` lines. Runs spanning
    /// a newline contribute one piece to each line they touch; empty pieces
    /// are kept so table-cell runs ending in a newline stay visible.
    pub fn lines(&self) -> Vec<Line<'_>> {
        let mut lines = vec![Line::default()];
        for segment in &self.segments {
            match segment {
                Segment::Text(run) => {
                    for (i, part) in run.text.split('\n').enumerate() {
                        if i > 0 {
                            lines.push(Line::default());
                        }
                        if let Some(line) = lines.last_mut() {
                            line.pieces.push(Piece::Text(part, &run.attributes));
                        }
                    }
                }
                Segment::Attachment(attachment) => {
                    if let Some(line) = lines.last_mut() {
                        line.pieces.push(Piece::Attachment(attachment));
                    }
                }
            }
        }
        lines
    }
}

/// A borrowed slice of one line: part of a run, or an attachment.
#[derive(Debug, Clone, Copy)]
pub enum Piece<'a> {
    Text(&'a str, &'a RunAttributes),
    Attachment(&'a Attachment),
}

impl<'a> Piece<'a> {
    pub fn table_cell(&self) -> Option<&'a str> {
        match self {
            Piece::Text(_, attrs) => attrs.table_cell.as_deref(),
            Piece::Attachment(_) => None,
        }
    }

    /// True for text pieces with nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        matches!(self, Piece::Text(text, _) if text.trim().is_empty())
    }
}

/// One newline-delimited line of a [`RichDocument`].
#[derive(Debug, Clone, Default)]
pub struct Line<'a> {
    pub pieces: Vec<Piece<'a>>,
}

impl<'a> Line<'a> {
    /// Line text with attachments shown as U+FFFC.
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text, _) => out.push_str(text),
                Piece::Attachment(_) => out.push(OBJECT_REPLACEMENT),
            }
        }
        out
    }

    /// Attributes of the line's first character, if it is text.
    pub fn leading_attributes(&self) -> Option<&'a RunAttributes> {
        self.pieces.iter().find_map(|p| match p {
            Piece::Text(text, attrs) if !text.is_empty() => Some(Some(*attrs)),
            Piece::Text(..) => None,
            Piece::Attachment(_) => Some(None),
        })?
    }

    pub fn is_blank(&self) -> bool {
        self.pieces.iter().all(Piece::is_blank)
    }

    /// True when the line holds table-cell text and nothing else visible.
    pub fn is_table_cells_only(&self) -> bool {
        self.pieces.iter().any(|p| p.table_cell().is_some())
            && self
                .pieces
                .iter()
                .all(|p| p.table_cell().is_some() || p.is_blank())
    }
}

/// Everything the engine consumes for one conversion.
#[derive(Debug, Clone, Default)]
pub struct ConversionInput {
    pub document: RichDocument,
    /// Structured markup (RTF) of the same document, consulted for table geometry.
    pub markup: Option<String>,
    /// Independent plain-text capture, consulted for checkbox state.
    pub plain_text: Option<String>,
}

impl ConversionInput {
    pub fn new(document: RichDocument) -> Self {
        Self {
            document,
            markup: None,
            plain_text: None,
        }
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = Some(markup.into());
        self
    }

    pub fn with_plain_text(mut self, text: impl Into<String>) -> Self {
        self.plain_text = Some(text.into());
        self
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}

mod base64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|e| STANDARD.decode(e.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_document() {
        let json = r#"{
            "segments": [
                {"type": "text", "text": "Title\n", "font_size": 28.0},
                {"type": "text", "text": "bold", "bold": true},
                {"type": "attachment", "contents": "iVBORw0KGgo="},
                {"type": "text", "text": "item\n", "list_marker": "decimal", "indent_depth": 1}
            ]
        }"#;
        let doc = RichDocument::from_json(json).expect("valid document");
        assert_eq!(doc.segments.len(), 4);
        match &doc.segments[2] {
            Segment::Attachment(a) => {
                assert_eq!(a.contents.as_deref(), Some(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A][..]));
            }
            other => panic!("expected attachment, got {other:?}"),
        }
        match &doc.segments[3] {
            Segment::Text(run) => {
                assert_eq!(run.attributes.list_marker, Some(MarkerKind::Decimal));
                assert_eq!(run.attributes.indent_depth, 1);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_invalid_document() {
        let err = RichDocument::from_json("{\"segments\": 3}").unwrap_err();
        assert!(matches!(err, Clip2MdError::InvalidDocument { .. }));
    }

    #[test]
    fn empty_detection() {
        let mut doc = RichDocument::default();
        assert!(doc.is_empty());
        doc.push_text("", RunAttributes::default());
        assert!(doc.is_empty());
        doc.push_attachment(Attachment::default());
        assert!(!doc.is_empty());
    }

    #[test]
    fn plain_text_marks_attachments() {
        let mut doc = RichDocument::default();
        doc.push_text("a", RunAttributes::default());
        doc.push_attachment(Attachment::from_bytes(vec![1, 2, 3]));
        doc.push_text("b", RunAttributes::default());
        assert_eq!(doc.plain_text(), "a\u{FFFC}b");
        assert_eq!(doc.attachment_count(), 1);
    }

    #[test]
    fn lines_follow_newlines() {
        let mut doc = RichDocument::default();
        doc.push_text("one\ntw", RunAttributes::default());
        let bold = RunAttributes {
            bold: true,
            ..Default::default()
        };
        doc.push_text("o\n", bold.clone());
        doc.push_attachment(Attachment::default());
        let lines = doc.lines();
        assert_eq!(lines.len(), doc.plain_text().split('\n').count());
        assert_eq!(lines[0].raw_text(), "one");
        assert_eq!(lines[1].raw_text(), "two");
        assert_eq!(lines[2].raw_text(), "\u{FFFC}");
        assert_eq!(lines[1].leading_attributes(), Some(&RunAttributes::default()));
        assert_eq!(lines[2].leading_attributes(), None);
    }

    #[test]
    fn table_cell_only_lines() {
        let cell = |id: &str| RunAttributes {
            table_cell: Some(id.into()),
            ..Default::default()
        };
        let mut doc = RichDocument::default();
        doc.push_text("A\n", cell("a"));
        doc.push_text("B\n", cell("b"));
        doc.push_text("after", RunAttributes::default());
        let lines = doc.lines();
        assert!(lines[0].is_table_cells_only());
        assert!(lines[1].is_table_cells_only());
        assert!(!lines[2].is_table_cells_only());
    }

    #[test]
    fn declared_mime_classification() {
        let mut a = Attachment::from_bytes(vec![0; 4]);
        assert!(!a.is_declared_non_image());
        a.mime_type = Some("application/pdf".into());
        assert!(a.is_declared_non_image());
        a.mime_type = Some("Image/PNG".into());
        assert!(!a.is_declared_non_image());
    }
}
