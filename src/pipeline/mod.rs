//! Pipeline stages for rich-document → Markdown conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. The assembler in [`crate::convert`] drives them line by line.
//!
//! ## Data Flow
//!
//! ```text
//! markup ──▶ table_structure ──▶ table_content ─┐
//!  (RTF)       (geometry)         (cell text)   │ placeholders
//!                                               ▼
//! document ──▶ lines ──▶ list / inline / image ──▶ body ──▶ front_matter + body
//! ```
//!
//! 1. [`sniff`]           — image format from leading bytes
//! 2. [`table_structure`] — row/column geometry from RTF table groups
//! 3. [`table_content`]   — cell text from the runs; pipe-table rendering
//! 4. [`list`]            — list markers → Markdown list syntax, with counters
//! 5. [`inline`]          — bold/italic/underline/strike/link/heading markers
//! 6. [`image`]           — re-encoding and concurrent alt text; the only
//!    stage that suspends
//! 7. [`encode`]          — codec helpers used by [`image`] and the analyzer
//! 8. [`front_matter`]    — typed fields → YAML header

pub mod encode;
pub mod front_matter;
pub mod image;
pub mod inline;
pub mod list;
pub mod sniff;
pub mod table_content;
pub mod table_structure;
