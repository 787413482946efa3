//! # clip2md
//!
//! Convert rich clipboard documents (styled text runs, inline attachments and
//! an RTF rendition of the same content) into Markdown plus image assets.
//!
//! ## Why this crate?
//!
//! Pasting rich text into a Markdown editor loses nearly everything: lists
//! become tab soup, tables collapse into runs of cells, images vanish. The
//! styled runs know the emphasis and the list markers, the RTF knows the table
//! geometry, and neither alone is enough. This crate reads both and produces
//! deterministic Markdown, with alt text for images from any vision model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! RichDocument (+ RTF markup, + plain text)
//!  │
//!  ├─ 1. Tables   RTF geometry + cell text → placeholders
//!  ├─ 2. Lines    per line: images → list markers → heading → inline emphasis
//!  ├─ 3. Images   re-encode (spawn_blocking) + concurrent alt text, re-ordered
//!  ├─ 4. Tables   placeholders → pipe tables
//!  └─ 5. Output   front matter + body, exported assets, suggested file name
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clip2md::{convert, ConversionConfig, ConversionInput, ImageHandling, RichDocument, StaticAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let json = std::fs::read_to_string("clipboard.json")?;
//!     let input = ConversionInput::new(RichDocument::from_json(&json)?);
//!     let config = ConversionConfig::builder()
//!         .image_handling(ImageHandling::Base64)
//!         .build()?;
//!     let result = convert(&input, &config, &StaticAnalyzer::default()).await?;
//!     println!("{}", result.markdown);
//!     for warning in &result.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Alt text
//!
//! Any [`ImageAnalyzer`] works. [`LlmImageAnalyzer`] asks a vision model via
//! `edgequake-llm`; the provider is auto-detected from `OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, … or named in [`AnalyzerConfig`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `clip2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! clip2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyzer;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyzer::{FnAnalyzer, ImageAnalyzer, LlmImageAnalyzer, StaticAnalyzer};
pub use config::{
    AltTextMode, AltTextTemplate, AnalyzerConfig, ConversionConfig, ConversionConfigBuilder,
    ImageHandling,
};
pub use convert::{convert, convert_sync};
pub use error::{Clip2MdError, ConversionWarning};
pub use model::{
    Attachment, ConversionInput, DecodedBitmap, MarkerKind, RichDocument, RunAttributes, Segment,
    StyledRun,
};
pub use output::{ConversionStats, OutputKind, ProcessingResult};
pub use pipeline::front_matter::{FieldType, FrontMatterField};
pub use pipeline::image::ImageResult;
pub use pipeline::sniff::{detect_format, ImageFormat};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
