//! Conversion entry points and the document assembler.
//!
//! The assembler walks the document one line at a time. Everything that
//! spans lines is decided before the walk (table geometry and placement) or
//! carried as assembler state (list counters, the global image number).
//! The only suspension point is the image batch of a line; its results are
//! awaited before the line is rendered, so output order never depends on
//! analyzer latency.

use crate::analyzer::ImageAnalyzer;
use crate::config::ConversionConfig;
use crate::error::{Clip2MdError, ConversionWarning};
use crate::model::{ConversionInput, Line, Piece, OBJECT_REPLACEMENT};
use crate::output::{ConversionStats, OutputKind, ProcessingResult};
use crate::pipeline::image::{non_image_reason, ImagePipeline, ImageResult, ImageTask, ATTACHMENT_MARKER};
use crate::pipeline::list::ListProcessor;
use crate::pipeline::table_content::{self, TableAnchor, TableInfo};
use crate::pipeline::{front_matter, inline, table_structure};
use crate::template::TemplateContext;
use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a rich document to Markdown.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — the document, plus optional RTF markup (table geometry) and
///   an optional plain-text capture (checkbox state)
/// * `config` — conversion settings
/// * `analyzer` — produces image descriptions for alt text
///
/// # Returns
/// `Ok(ProcessingResult)` even when images or tables degraded; inspect
/// `result.warnings`.
///
/// # Errors
/// Returns `Err(Clip2MdError::EmptyDocument)` when there is nothing to convert.
///
/// # Example
/// ```rust,no_run
/// use clip2md::{convert, ConversionConfig, ConversionInput, RichDocument, StaticAnalyzer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let json = std::fs::read_to_string("clipboard.json")?;
/// let input = ConversionInput::new(RichDocument::from_json(&json)?);
/// let result = convert(&input, &ConversionConfig::default(), &StaticAnalyzer::default()).await?;
/// println!("{}", result.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input: &ConversionInput,
    config: &ConversionConfig,
    analyzer: &dyn ImageAnalyzer,
) -> Result<ProcessingResult, Clip2MdError> {
    let total_start = Instant::now();
    let document = &input.document;
    if document.is_empty() {
        return Err(Clip2MdError::EmptyDocument);
    }

    let now = config.now();
    let plain = document.plain_text();
    let seed = preview_seed(&plain);
    let templates = TemplateContext::new(now, &seed, &config.front_matter);
    info!(
        "Starting conversion: {} segment(s), {} attachment(s), images {:?}",
        document.segments.len(),
        document.attachment_count(),
        config.image_handling
    );

    // ── Step 1: Table geometry and content ───────────────────────────────
    let structures = input
        .markup
        .as_deref()
        .map(table_structure::extract_structures)
        .unwrap_or_default();
    let table_content::Reconciled { tables, warnings } =
        table_content::reconcile(document, &structures);
    debug!("Recovered {} table(s)", tables.len());
    let placement = TablePlacement::new(&tables);

    // ── Step 2: Count images for progress reporting ──────────────────────
    let lines = document.lines();
    let total_images: usize = lines
        .iter()
        .enumerate()
        .filter(|(i, line)| placement.block_containing(*i).is_none() && !line.is_table_cells_only())
        .map(|(_, line)| count_images(line))
        .sum();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total_images);
    }

    // ── Step 3: Line loop ────────────────────────────────────────────────
    let siblings: Vec<&str> = input
        .plain_text
        .as_deref()
        .map(|t| t.split('\n').collect())
        .unwrap_or_default();

    let mut assembler = Assembler {
        images: ImagePipeline::new(config, templates, total_images),
        list: ListProcessor::new(),
        next_image: 1,
        out: Vec::with_capacity(lines.len()),
        assets: Vec::new(),
        warnings,
        stats: ConversionStats {
            total_lines: lines.len(),
            total_images,
            tables: tables.len(),
            ..Default::default()
        },
    };

    for (i, line) in lines.iter().enumerate() {
        if let Some((range, placeholder)) = placement.block_containing(i) {
            if range.start == i {
                assembler.out.push(placeholder.to_string());
            }
            for _ in 0..count_images(line) {
                warn!("Line {}: image inside table text dropped", i + 1);
                assembler
                    .warnings
                    .push(ConversionWarning::ImageInsideTable { line: i + 1 });
            }
            assembler.list.end_list();
            continue;
        }
        if let Some(placeholders) = placement.before_line.get(&i) {
            assembler.out.extend(placeholders.iter().map(|p| p.to_string()));
        }
        if line.is_table_cells_only() {
            assembler.list.end_list();
            continue;
        }
        let rendered = assembler
            .render_line(i, line, siblings.get(i).copied(), analyzer)
            .await;
        assembler.out.push(rendered);
    }

    for placeholder in &placement.at_end {
        if assembler.out.last().is_some_and(|l| !l.is_empty()) {
            assembler.out.push(String::new());
        }
        assembler.out.push(placeholder.to_string());
    }

    // ── Step 4: Stitch ───────────────────────────────────────────────────
    let mut body = assembler.out.join("\n");
    for table in &tables {
        let md = table.to_markdown();
        // A following blank line already separates the table.
        body = body.replace(&format!("{}\n\n", table.placeholder), &format!("{md}\n"));
        body = body.replace(&table.placeholder, &md);
    }

    let header = front_matter::render_at(&config.front_matter, now);
    let markdown = if header.is_empty() {
        body
    } else {
        format!("{header}\n{body}")
    };

    let output_kind = if !assembler.assets.is_empty() {
        OutputKind::BundleWithAssets
    } else if markdown.trim().is_empty() {
        OutputKind::None
    } else {
        OutputKind::MarkdownOnly
    };

    let mut stats = assembler.stats;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {} line(s), {}/{} image(s), {} table(s), {} warning(s), {}ms",
        stats.total_lines,
        stats.images_converted,
        stats.total_images,
        stats.tables,
        assembler.warnings.len(),
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(stats.total_images, stats.images_converted);
    }

    Ok(ProcessingResult {
        markdown,
        assets: assembler.assets,
        output_kind,
        suggested_filename: templates.output_filename(&config.output_filename_format),
        warnings: assembler.warnings,
        stats,
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn convert_sync(
    input: &ConversionInput,
    config: &ConversionConfig,
    analyzer: &dyn ImageAnalyzer,
) -> Result<ProcessingResult, Clip2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Clip2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config, analyzer))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Per-conversion state, mutated only between lines.
struct Assembler<'a> {
    images: ImagePipeline<'a>,
    list: ListProcessor,
    /// 1-based number of the next image.
    next_image: usize,
    out: Vec<String>,
    assets: Vec<ImageResult>,
    warnings: Vec<ConversionWarning>,
    stats: ConversionStats,
}

impl Assembler<'_> {
    async fn render_line(
        &mut self,
        number: usize,
        line: &Line<'_>,
        plain_sibling: Option<&str>,
        analyzer: &dyn ImageAnalyzer,
    ) -> String {
        // Images first: the line is rendered only once all of them are back.
        let mut tasks = Vec::new();
        for piece in &line.pieces {
            if let Piece::Attachment(attachment) = piece {
                match non_image_reason(attachment) {
                    Some(mime) => {
                        self.warnings.push(ConversionWarning::UnsupportedAttachment {
                            line: number + 1,
                            mime,
                        });
                        self.stats.attachments_skipped += 1;
                    }
                    None => tasks.push(ImageTask::from_attachment(attachment, tasks.len())),
                }
            }
        }
        let (results, next) = self
            .images
            .process_batch(tasks, analyzer, self.next_image)
            .await;
        self.next_image = next;
        let mut results = results.into_iter();

        // List and heading decisions use the line's first character.
        let raw = line.raw_text();
        let lead = line.leading_attributes();
        let marker = lead.and_then(|a| a.list_marker.map(|m| (m, a.indent_depth.max(1))));
        let item = self.list.classify(&raw, marker, plain_sibling);
        if item.is_none() {
            self.list.end_list();
        }
        let heading = match (&item, lead) {
            (None, Some(attrs)) => inline::heading_level(attrs),
            _ => None,
        };
        let skip = item.as_ref().map_or(0, |it| it.content_start);

        let mut content = String::new();
        let mut offset = 0;
        for piece in &line.pieces {
            match piece {
                Piece::Text(text, attrs) => {
                    let start = offset;
                    offset += text.len();
                    if attrs.table_cell.is_some() {
                        continue;
                    }
                    let from = skip.saturating_sub(start).min(text.len());
                    let visible = text.get(from..).unwrap_or_default();
                    content.push_str(&inline::render_span(visible, attrs, heading.is_some()));
                }
                Piece::Attachment(attachment) => {
                    offset += OBJECT_REPLACEMENT.len_utf8();
                    if non_image_reason(attachment).is_some() {
                        content.push_str(ATTACHMENT_MARKER);
                    } else if let Some(result) = results.next() {
                        content.push_str(&result.rendered_markdown);
                        self.record(result);
                    }
                }
            }
        }

        match (item, heading) {
            (Some(item), _) => item.render(&content),
            (None, Some(level)) if !content.trim().is_empty() => {
                format!("{}{}", inline::heading_prefix(level), content.trim())
            }
            _ => content,
        }
    }

    fn record(&mut self, result: ImageResult) {
        match result.warning.clone() {
            Some(warning) => {
                self.stats.images_failed += 1;
                self.warnings.push(warning);
            }
            None => self.stats.images_converted += 1,
        }
        if result.path.is_some() && result.exportable_bytes.is_some() {
            self.assets.push(result);
        }
    }
}

/// Where each table placeholder goes in the output lines.
struct TablePlacement<'t> {
    /// Placeholders emitted just before a line.
    before_line: HashMap<usize, Vec<&'t str>>,
    /// Line ranges replaced wholesale by a placeholder.
    blocks: Vec<(Range<usize>, &'t str)>,
    /// Placeholders appended after the last line.
    at_end: Vec<&'t str>,
}

impl<'t> TablePlacement<'t> {
    fn new(tables: &'t [TableInfo]) -> Self {
        let mut placement = Self {
            before_line: HashMap::new(),
            blocks: Vec::new(),
            at_end: Vec::new(),
        };
        for table in tables {
            let token = table.placeholder.as_str();
            match &table.anchor {
                TableAnchor::Region { line } => placement.before_line.entry(*line).or_default().push(token),
                TableAnchor::Block { lines } => placement.blocks.push((lines.clone(), token)),
                TableAnchor::End => placement.at_end.push(token),
            }
        }
        placement
    }

    fn block_containing(&self, line: usize) -> Option<(&Range<usize>, &'t str)> {
        self.blocks
            .iter()
            .find(|(range, _)| range.contains(&line))
            .map(|(range, token)| (range, *token))
    }
}

fn count_images(line: &Line<'_>) -> usize {
    line.pieces
        .iter()
        .filter(|p| matches!(p, Piece::Attachment(a) if non_image_reason(a).is_none()))
        .count()
}

/// First line of the document with visible text, for `{clipboard_preview}`.
fn preview_seed(plain: &str) -> String {
    plain
        .split('\n')
        .map(|l| l.replace(OBJECT_REPLACEMENT, ""))
        .map(|l| l.trim().to_string())
        .find(|l| !l.is_empty())
        .unwrap_or_default()
}
