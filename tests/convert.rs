//! Offline integration tests for the full conversion pipeline.
//!
//! Every test drives `clip2md::convert` end to end with in-memory documents
//! and deterministic analyzers; no network access is needed.

use clip2md::{
    convert, AltTextMode, AltTextTemplate, Attachment, ConversionConfig, ConversionInput,
    ConversionProgressCallback, ConversionWarning, FieldType, FnAnalyzer, FrontMatterField,
    ImageHandling, MarkerKind, OutputKind, RichDocument, RunAttributes, StaticAnalyzer,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const RTF_2X2: &str = r"{\rtf1\ansi
\itap1\trowd \taflags1 \trgaph108\trleft-108 \clvertalc \cellx4320
\clvertalc \cellx8640
\pard\intbl\itap1\cf0 A\cell
\pard\intbl\itap1\cf0 B\cell \row
\itap1\trowd \taflags1 \trgaph108\trleft-108 \clvertalc \cellx4320
\clvertalc \cellx8640
\pard\intbl\itap1\cf0 C\cell
\pard\intbl\itap1\cf0 D\cell \lastrow\row
}";

fn png(width: u32, color: [u8; 4]) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, 2, Rgba(color)));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("png encode");
    buf
}

fn clock() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2025, 7, 1)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .expect("valid date")
}

fn config() -> ConversionConfig {
    ConversionConfig::builder()
        .clock(clock())
        .build()
        .expect("valid config")
}

fn marker(kind: MarkerKind, depth: u8) -> RunAttributes {
    RunAttributes {
        list_marker: Some(kind),
        indent_depth: depth,
        ..Default::default()
    }
}

fn cell(id: &str) -> RunAttributes {
    RunAttributes {
        table_cell: Some(id.into()),
        ..Default::default()
    }
}

async fn markdown_of(input: ConversionInput, config: &ConversionConfig) -> String {
    convert(&input, config, &StaticAnalyzer::default())
        .await
        .expect("conversion succeeds")
        .markdown
}

// ── Lists ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_tab_hyphen_item() {
    let mut doc = RichDocument::default();
    doc.push_text("\t•\t\t•\tHello", marker(MarkerKind::Hyphen, 1));
    assert_eq!(markdown_of(ConversionInput::new(doc), &config()).await, "- Hello");
}

#[tokio::test]
async fn consecutive_numbered_items_use_lazy_numbering() {
    let mut doc = RichDocument::default();
    doc.push_text("\t1.\titem\n", marker(MarkerKind::Decimal, 1));
    doc.push_text("\t2.\titem", marker(MarkerKind::Decimal, 1));
    assert_eq!(
        markdown_of(ConversionInput::new(doc), &config()).await,
        "1. item\n1. item"
    );
}

#[tokio::test]
async fn nested_items_are_indented_and_clamped() {
    let mut doc = RichDocument::default();
    doc.push_text("\t•\ttop\n", marker(MarkerKind::Disc, 1));
    doc.push_text("\t•\tmiddle\n", marker(MarkerKind::Disc, 2));
    doc.push_text("\t•\tdeep\n", marker(MarkerKind::Disc, 7));
    doc.push_text("done", RunAttributes::default());
    assert_eq!(
        markdown_of(ConversionInput::new(doc), &config()).await,
        "* top\n    * middle\n        * deep\ndone"
    );
}

#[tokio::test]
async fn checkbox_state_comes_from_plain_text() {
    let mut doc = RichDocument::default();
    doc.push_text("\t✓\tBuy milk\n", marker(MarkerKind::Check, 1));
    doc.push_text("\t◦\tWalk dog", marker(MarkerKind::Check, 1));
    let input = ConversionInput::new(doc).with_plain_text("✓ Buy milk\n◦ Walk dog");
    assert_eq!(
        markdown_of(input, &config()).await,
        "- [x] Buy milk\n- [ ] Walk dog"
    );
}

#[tokio::test]
async fn checkbox_without_plain_text_is_unchecked() {
    let mut doc = RichDocument::default();
    doc.push_text("\t✓\tBuy milk", marker(MarkerKind::Check, 1));
    assert_eq!(
        markdown_of(ConversionInput::new(doc), &config()).await,
        "- [ ] Buy milk"
    );
}

// ── Inline formatting ────────────────────────────────────────────────────────

#[tokio::test]
async fn inline_styles_and_links() {
    let mut doc = RichDocument::default();
    doc.push_text("Read ", RunAttributes::default());
    doc.push_text(
        "the docs",
        RunAttributes {
            link: Some("https://example.com".into()),
            bold: true,
            ..Default::default()
        },
    );
    doc.push_text(" and ", RunAttributes::default());
    doc.push_text(
        "everything",
        RunAttributes {
            bold: true,
            italic: true,
            underline: true,
            strikethrough: true,
            ..Default::default()
        },
    );
    assert_eq!(
        markdown_of(ConversionInput::new(doc), &config()).await,
        "Read [the docs](https://example.com) and **~~<u>*everything*</u>~~**"
    );
}

#[tokio::test]
async fn plain_text_passes_through_unchanged() {
    let text = "Just words.\n\nAnother paragraph with * stars.";
    let mut doc = RichDocument::default();
    doc.push_text(text, RunAttributes::default());
    assert_eq!(markdown_of(ConversionInput::new(doc), &config()).await, text);
}

#[tokio::test]
async fn heading_sizes() {
    let mut doc = RichDocument::default();
    let size = |pt: f32| RunAttributes {
        font_size: Some(pt),
        ..Default::default()
    };
    doc.push_text("Title\n", size(25.0));
    doc.push_text("Section\n", size(20.0));
    doc.push_text("Body", size(17.0));
    assert_eq!(
        markdown_of(ConversionInput::new(doc), &config()).await,
        "# Title\n## Section\nBody"
    );
}

// ── Tables ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn untagged_two_by_two_table() {
    let mut doc = RichDocument::default();
    doc.push_text("A\tB\nC\tD", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    let result = convert(&input, &config(), &StaticAnalyzer::default())
        .await
        .expect("conversion succeeds");
    assert_eq!(result.markdown, "| A | B |\n|---|---|\n| C | D |\n");
    assert_eq!(result.stats.tables, 1);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn tagged_table_stays_in_place() {
    let mut doc = RichDocument::default();
    doc.push_text("Intro\n", RunAttributes::default());
    for id in ["a", "b", "c", "d"] {
        doc.push_text(format!("{}\n", id.to_uppercase()), cell(id));
    }
    doc.push_text("After", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    assert_eq!(
        markdown_of(input, &config()).await,
        "Intro\n| A | B |\n|---|---|\n| C | D |\n\nAfter"
    );
}

#[tokio::test]
async fn short_table_content_is_padded_with_warning() {
    let mut doc = RichDocument::default();
    doc.push_text("A\tB\nC\t", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    let result = convert(&input, &config(), &StaticAnalyzer::default())
        .await
        .expect("conversion succeeds");
    assert_eq!(result.markdown, "| A | B |\n|---|---|\n| C |   |\n");
    assert_eq!(
        result.warnings,
        vec![ConversionWarning::TableContentShortfall {
            table: 1,
            expected: 4,
            found: 3
        }]
    );
}

#[tokio::test]
async fn title_line_above_table_is_kept() {
    let mut doc = RichDocument::default();
    doc.push_text("Shopping\nA\tB\nC\tD\n\nAfter", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    let result = convert(&input, &config(), &StaticAnalyzer::default())
        .await
        .expect("conversion succeeds");
    assert_eq!(
        result.markdown,
        "Shopping\n| A | B |\n|---|---|\n| C | D |\n\nAfter"
    );
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[tokio::test]
async fn newline_separated_cells_are_replaced_in_place() {
    let mut doc = RichDocument::default();
    doc.push_text("A\nB\nC\nD", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    let result = convert(&input, &config(), &StaticAnalyzer::default())
        .await
        .expect("conversion succeeds");
    assert_eq!(result.markdown, "| A | B |\n|---|---|\n| C | D |\n");
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[tokio::test]
async fn empty_first_cell_row_is_part_of_the_table() {
    let mut doc = RichDocument::default();
    doc.push_text("\tB\nC\tD", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    assert_eq!(
        markdown_of(input, &config()).await,
        "|   | B |\n|---|---|\n| C | D |\n"
    );
}

#[tokio::test]
async fn image_inside_table_text_is_reported() {
    let mut doc = RichDocument::default();
    doc.push_text("A\tB", RunAttributes::default());
    doc.push_attachment(Attachment::from_bytes(png(1, [0, 0, 0, 255])));
    doc.push_text("\nC\tD", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    let result = convert(&input, &config(), &StaticAnalyzer::default())
        .await
        .expect("conversion succeeds");
    assert_eq!(result.markdown, "| A | B |\n|---|---|\n| C | D |\n");
    assert_eq!(
        result.warnings,
        vec![ConversionWarning::ImageInsideTable { line: 1 }]
    );
}

#[tokio::test]
async fn unplaceable_table_goes_last_with_warning() {
    let mut doc = RichDocument::default();
    doc.push_text("left", RunAttributes::default());
    doc.push_attachment(Attachment::from_bytes(png(1, [0, 0, 0, 255])));
    doc.push_text("right\nmiddle\nend", RunAttributes::default());
    let input = ConversionInput::new(doc).with_markup(RTF_2X2);
    let result = convert(&input, &config(), &StaticAnalyzer::default())
        .await
        .expect("conversion succeeds");
    assert!(result.markdown.starts_with("left<!-- Image ignored -->right\nmiddle\nend\n\n| "));
    assert!(result.markdown.ends_with(" |\n"));
    assert!(result
        .warnings
        .contains(&ConversionWarning::TablePositionUnknown { table: 1 }));
}

// ── Images ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn base64_png_image() {
    let mut doc = RichDocument::default();
    doc.push_attachment(Attachment::from_bytes(png(3, [0, 128, 255, 255])));
    let config = ConversionConfig::builder()
        .clock(clock())
        .image_handling(ImageHandling::Base64)
        .alt_text(AltTextMode::Fixed("diagram".into()))
        .build()
        .unwrap();
    let result = convert(&ConversionInput::new(doc), &config, &StaticAnalyzer::default())
        .await
        .unwrap();
    assert!(
        result.markdown.starts_with("![diagram](data:image/png;base64,iVBORw0KGgo"),
        "got {}",
        result.markdown
    );
    assert!(result.markdown.ends_with(')'));
    assert_eq!(result.output_kind, OutputKind::MarkdownOnly);
    assert!(result.assets.is_empty());
}

#[tokio::test]
async fn ignored_images_are_commented() {
    let mut doc = RichDocument::default();
    doc.push_text("before ", RunAttributes::default());
    doc.push_attachment(Attachment::from_bytes(png(1, [0, 0, 0, 255])));
    let md = markdown_of(ConversionInput::new(doc), &config()).await;
    assert_eq!(md, "before <!-- Image ignored -->");
}

#[tokio::test]
async fn image_order_survives_reverse_latency() {
    // Image widths 1..=4 tag each image; narrower images answer later.
    let analyzer = FnAnalyzer::new(|bytes: Arc<[u8]>| async move {
        let width = image::load_from_memory(&bytes).map(|i| i.width()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(u64::from(5 - width) * 25)).await;
        format!("width {width}")
    });

    let mut doc = RichDocument::default();
    for width in 1..=4 {
        doc.push_attachment(Attachment::from_bytes(png(width, [255, 0, 0, 255])));
        doc.push_text(" ", RunAttributes::default());
    }
    let config = ConversionConfig::builder()
        .clock(clock())
        .image_handling(ImageHandling::Base64)
        .alt_text(AltTextMode::Analyze(AltTextTemplate::Objects))
        .build()
        .unwrap();

    let result = convert(&ConversionInput::new(doc), &config, &analyzer)
        .await
        .unwrap();
    let positions: Vec<usize> = (1..=4)
        .map(|w| {
            result
                .markdown
                .find(&format!("![width {w}]"))
                .unwrap_or_else(|| panic!("image {w} missing"))
        })
        .collect();
    assert!(positions.windows(2).all(|p| p[0] < p[1]), "{positions:?}");
}

#[tokio::test]
async fn folder_export_numbers_images_across_lines() {
    let mut doc = RichDocument::default();
    doc.push_text("Cats and dogs\n", RunAttributes::default());
    doc.push_attachment(Attachment::from_bytes(png(2, [1, 2, 3, 255])));
    doc.push_text("\n", RunAttributes::default());
    doc.push_attachment(Attachment::from_bytes(png(2, [4, 5, 6, 255])));

    let config = ConversionConfig::builder()
        .clock(clock())
        .image_handling(ImageHandling::SaveToFolder)
        .image_folder("assets/{clipboard_preview}")
        .alt_text(AltTextMode::Analyze(AltTextTemplate::ImageOf))
        .build()
        .unwrap();
    let result = convert(
        &ConversionInput::new(doc),
        &config,
        &StaticAnalyzer::new("a pet"),
    )
    .await
    .unwrap();

    assert_eq!(
        result.markdown,
        "Cats and dogs\n![Image of a pet](assets/cats-and-dogs/image1.png)\n![Image of a pet](assets/cats-and-dogs/image2.png)"
    );
    assert_eq!(result.output_kind, OutputKind::BundleWithAssets);
    let paths: Vec<&str> = result.asset_files().map(|(p, _)| p).collect();
    assert_eq!(
        paths,
        vec!["assets/cats-and-dogs/image1.png", "assets/cats-and-dogs/image2.png"]
    );
    assert_eq!(result.suggested_filename, "note_2025-07-01_cats-and-dogs.md");
}

#[tokio::test]
async fn broken_image_degrades_without_failing() {
    let mut doc = RichDocument::default();
    doc.push_text("x ", RunAttributes::default());
    doc.push_attachment(Attachment::from_bytes(b"not really a png file".to_vec()));
    let config = ConversionConfig::builder()
        .clock(clock())
        .image_handling(ImageHandling::SaveToFolder)
        .alt_text(AltTextMode::Disabled)
        .build()
        .unwrap();
    let result = convert(&ConversionInput::new(doc), &config, &StaticAnalyzer::default())
        .await
        .unwrap();
    assert_eq!(result.markdown, "x ![Image](<image conversion failed>)");
    assert_eq!(result.stats.images_failed, 1);
    assert!(result.assets.is_empty());
    assert!(matches!(
        result.warnings.as_slice(),
        [ConversionWarning::ImageExtractionFailed { index: 1, .. }]
    ));
}

// ── Front matter ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn tag_front_matter_precedes_body() {
    let mut doc = RichDocument::default();
    doc.push_text("Hello", RunAttributes::default());
    let config = ConversionConfig::builder()
        .clock(clock())
        .front_matter(vec![
            FrontMatterField::new("tags", FieldType::Tag, "ios, swift"),
            FrontMatterField::new("created", FieldType::CurrentDate, "ignored"),
        ])
        .build()
        .unwrap();
    assert_eq!(
        markdown_of(ConversionInput::new(doc), &config).await,
        "---\ntags:\n  - \"ios\"\n  - \"swift\"\ncreated: \"2025-07-01\"\n---\nHello"
    );
}

// ── Progress and errors ──────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    total: AtomicUsize,
    successes: AtomicUsize,
}

impl ConversionProgressCallback for Counting {
    fn on_conversion_start(&self, total_images: usize) {
        self.total.store(total_images, Ordering::SeqCst);
    }
    fn on_image_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_image_complete(&self, _index: usize, _total: usize, _alt: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_image_error(&self, _index: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_conversion_complete(&self, _total: usize, success_count: usize) {
        self.successes.store(success_count, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_per_image() {
    let counting = Arc::new(Counting::default());
    let mut doc = RichDocument::default();
    doc.push_attachment(Attachment::from_bytes(png(1, [0, 0, 0, 255])));
    doc.push_attachment(Attachment::from_bytes(b"garbage bytes here".to_vec()));
    doc.push_attachment(Attachment {
        contents: Some(vec![1, 2, 3]),
        mime_type: Some("text/plain".into()),
        ..Default::default()
    });

    let config = ConversionConfig::builder()
        .clock(clock())
        .image_handling(ImageHandling::Base64)
        .progress_callback(counting.clone())
        .build()
        .unwrap();
    convert(&ConversionInput::new(doc), &config, &StaticAnalyzer::default())
        .await
        .unwrap();

    assert_eq!(counting.total.load(Ordering::SeqCst), 2);
    assert_eq!(counting.started.load(Ordering::SeqCst), 2);
    assert_eq!(counting.completed.load(Ordering::SeqCst), 1);
    assert_eq!(counting.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counting.successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn whitespace_only_document_has_no_output() {
    let mut doc = RichDocument::default();
    doc.push_text("  \n ", RunAttributes::default());
    let result = convert(&ConversionInput::new(doc), &config(), &StaticAnalyzer::default())
        .await
        .unwrap();
    assert_eq!(result.output_kind, OutputKind::None);
}

#[test]
fn convert_sync_runs_outside_a_runtime() {
    let mut doc = RichDocument::default();
    doc.push_text("sync", RunAttributes::default());
    let result =
        clip2md::convert_sync(&ConversionInput::new(doc), &config(), &StaticAnalyzer::default())
            .unwrap();
    assert_eq!(result.markdown, "sync");
}

#[test]
fn document_json_round_trip_through_convert() {
    let json = r#"{"segments": [
        {"type": "text", "text": "Big\n", "font_size": 26.0},
        {"type": "text", "text": "\t1.\tfirst", "list_marker": "decimal", "indent_depth": 1}
    ]}"#;
    let doc = RichDocument::from_json(json).unwrap();
    let result =
        clip2md::convert_sync(&ConversionInput::new(doc), &config(), &StaticAnalyzer::default())
            .unwrap();
    assert_eq!(result.markdown, "# Big\n1. first");
}
