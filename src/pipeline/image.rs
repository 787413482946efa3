//! Image pipeline: attachment bytes → Markdown image references and assets.
//!
//! ## Flow per line
//!
//! ```text
//! attachments ──▶ ImageTask ──▶ render (spawn_blocking) ──▶ alt text (analyzer)
//!                 (extract,      (decode, re-encode,          (bounded fan-out,
//!                  sniff)         data URI / path)              re-sorted by position)
//! ```
//!
//! The analyzer is the only slow, concurrent step. Its calls for one line are
//! driven through `buffer_unordered`, so results arrive in completion order;
//! they are sorted back by `position_index` before the caller sees them.
//!
//! Degradations never abort the conversion. An image that cannot be decoded
//! or re-encoded renders as `![alt](<image conversion failed>)` and carries a
//! [`ConversionWarning`].

use crate::analyzer::ImageAnalyzer;
use crate::config::{AltTextMode, ConversionConfig, ImageHandling};
use crate::error::ConversionWarning;
use crate::model::Attachment;
use crate::pipeline::encode;
use crate::pipeline::sniff::{detect_format, determine_output_format, ImageFormat};
use crate::template::TemplateContext;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rendered in place of every image when images are ignored.
pub const IGNORED_MARKER: &str = "<!-- Image ignored -->";
/// Rendered in place of an attachment that is not an image.
pub const ATTACHMENT_MARKER: &str = "<!-- ![attachment] -->";
/// Link target of an image that could not be converted.
pub const FAILED_TARGET: &str = "<image conversion failed>";

/// One image awaiting processing.
#[derive(Debug, Clone)]
pub struct ImageTask {
    pub bytes: Arc<[u8]>,
    pub original_format: ImageFormat,
    /// Order of the image within its line.
    pub position_index: usize,
    extraction_error: Option<String>,
}

impl ImageTask {
    pub fn new(bytes: impl Into<Arc<[u8]>>, position_index: usize) -> Self {
        let bytes = bytes.into();
        Self {
            original_format: detect_format(&bytes),
            bytes,
            position_index,
            extraction_error: None,
        }
    }

    /// Pull bytes out of an attachment: content buffer, then wrapped file,
    /// then decoded bitmap (encoded as PNG). The first non-empty source wins.
    pub fn from_attachment(attachment: &Attachment, position_index: usize) -> Self {
        match extract_bytes(attachment) {
            Ok(bytes) => Self::new(bytes, position_index),
            Err(detail) => Self {
                bytes: Arc::from(Vec::new()),
                original_format: ImageFormat::Unknown,
                position_index,
                extraction_error: Some(detail),
            },
        }
    }
}

/// The outcome for one image.
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub position_index: usize,
    /// 1-based global image number, as used in exported file names.
    pub index: usize,
    pub alt_text: String,
    pub rendered_markdown: String,
    pub final_format: ImageFormat,
    /// Bytes to write to `path` (folder export only).
    pub exportable_bytes: Option<Vec<u8>>,
    /// Relative path the Markdown links to (folder export only).
    pub path: Option<String>,
    pub warning: Option<ConversionWarning>,
}

impl ImageResult {
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}

/// Why an attachment is not treated as an image, if it isn't one.
///
/// Returns the MIME type to report (or `unknown` for an attachment without
/// any bytes).
pub fn non_image_reason(attachment: &Attachment) -> Option<String> {
    if attachment.is_declared_non_image() {
        return attachment.mime_type.clone();
    }
    if attachment.is_empty() {
        return Some(
            attachment
                .mime_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        );
    }
    None
}

fn extract_bytes(attachment: &Attachment) -> Result<Vec<u8>, String> {
    if let Some(bytes) = attachment.contents.as_ref().filter(|b| !b.is_empty()) {
        return Ok(bytes.clone());
    }
    if let Some(bytes) = attachment.file_wrapper.as_ref().filter(|b| !b.is_empty()) {
        return Ok(bytes.clone());
    }
    if let Some(bitmap) = &attachment.bitmap {
        return encode::bitmap_to_png(bitmap);
    }
    Err("attachment has no readable image data".to_string())
}

/// Collapse whitespace and escape brackets so the text is safe inside `![…]`.
pub fn sanitize_alt_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace('[', "\\[").replace(']', "\\]")
}

/// Converts the images of a document, one line's batch at a time.
pub struct ImagePipeline<'a> {
    config: &'a ConversionConfig,
    templates: TemplateContext<'a>,
    total_images: usize,
}

impl<'a> ImagePipeline<'a> {
    pub fn new(config: &'a ConversionConfig, templates: TemplateContext<'a>, total_images: usize) -> Self {
        Self {
            config,
            templates,
            total_images,
        }
    }

    /// Process one line's images.
    ///
    /// Images are numbered `start_index`, `start_index + 1`, … in task order.
    /// Returns the results sorted by `position_index` and the next free number.
    pub async fn process_batch(
        &self,
        tasks: Vec<ImageTask>,
        analyzer: &dyn ImageAnalyzer,
        start_index: usize,
    ) -> (Vec<ImageResult>, usize) {
        let count = tasks.len();
        if count == 0 {
            return (Vec::new(), start_index);
        }
        debug!("Processing {} image(s) starting at #{}", count, start_index);

        let mut results: Vec<ImageResult> = stream::iter(
            tasks
                .into_iter()
                .enumerate()
                .map(|(i, task)| self.process_one(task, start_index + i, analyzer)),
        )
        .buffer_unordered(self.config.analysis_concurrency.max(1))
        .collect()
        .await;

        results.sort_by_key(|r| r.position_index);
        (results, start_index + count)
    }

    async fn process_one(&self, task: ImageTask, index: usize, analyzer: &dyn ImageAnalyzer) -> ImageResult {
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_image_start(index, self.total_images);
        }

        let result = self.render(task, index, analyzer).await;

        if let Some(cb) = cb {
            match &result.warning {
                None => cb.on_image_complete(index, self.total_images, &result.alt_text),
                Some(w) => cb.on_image_error(index, self.total_images, &w.to_string()),
            }
        }
        result
    }

    async fn render(&self, task: ImageTask, index: usize, analyzer: &dyn ImageAnalyzer) -> ImageResult {
        let mode = self.config.image_handling;
        let mut result = ImageResult {
            position_index: task.position_index,
            index,
            alt_text: String::new(),
            rendered_markdown: String::new(),
            final_format: determine_output_format(task.original_format),
            exportable_bytes: None,
            path: None,
            warning: None,
        };

        if mode == ImageHandling::Ignore {
            result.rendered_markdown = IGNORED_MARKER.to_string();
            return result;
        }

        if let Some(detail) = task.extraction_error {
            warn!("Image {}: {}", index, detail);
            result.alt_text = self.fallback_alt();
            result.rendered_markdown = failure_markdown(&result.alt_text);
            result.warning = Some(ConversionWarning::ImageExtractionFailed { index, detail });
            return result;
        }

        let bytes = Arc::clone(&task.bytes);
        let original = task.original_format;
        let quality = self.config.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || reencode(&bytes, original, mode, quality))
            .await
            .unwrap_or_else(|e| {
                Err(RenderError::Encode {
                    format: original,
                    detail: format!("encoder task failed: {e}"),
                })
            });

        match encoded {
            Ok((format, bytes)) => {
                result.alt_text = self.alt_text(Arc::clone(&task.bytes), analyzer).await;
                result.final_format = format;
                match mode {
                    ImageHandling::Base64 => {
                        result.rendered_markdown =
                            format!("![{}]({})", result.alt_text, encode::data_uri(&bytes, format));
                    }
                    _ => {
                        let path = self
                            .templates
                            .image_path(&self.config.image_folder, index, format.extension());
                        result.rendered_markdown =
                            format!("![{}]({})", result.alt_text, link_target(&path));
                        result.path = Some(path);
                        result.exportable_bytes = Some(bytes);
                    }
                }
            }
            Err(err) => {
                warn!("Image {}: {}", index, err.detail());
                result.alt_text = self.fallback_alt();
                result.rendered_markdown = failure_markdown(&result.alt_text);
                result.warning = Some(err.into_warning(index));
            }
        }
        result
    }

    async fn alt_text(&self, bytes: Arc<[u8]>, analyzer: &dyn ImageAnalyzer) -> String {
        let text = match &self.config.alt_text {
            AltTextMode::Disabled => String::new(),
            AltTextMode::Fixed(text) => text.clone(),
            AltTextMode::Analyze(template) => template.apply(&analyzer.analyze(bytes).await),
        };
        let text = sanitize_alt_text(&text);
        if text.is_empty() {
            self.fallback_alt()
        } else {
            text
        }
    }

    fn fallback_alt(&self) -> String {
        sanitize_alt_text(&self.config.default_alt_text)
    }
}

fn failure_markdown(alt: &str) -> String {
    format!("![{alt}]({FAILED_TARGET})")
}

fn link_target(path: &str) -> String {
    if path.contains(|c: char| c.is_whitespace() || c == '(' || c == ')') {
        format!("<{path}>")
    } else {
        path.to_string()
    }
}

#[derive(Debug)]
enum RenderError {
    Decode(String),
    Encode { format: ImageFormat, detail: String },
}

impl RenderError {
    fn detail(&self) -> &str {
        match self {
            RenderError::Decode(d) => d,
            RenderError::Encode { detail, .. } => detail,
        }
    }

    fn into_warning(self, index: usize) -> ConversionWarning {
        match self {
            RenderError::Decode(detail) => ConversionWarning::ImageExtractionFailed { index, detail },
            RenderError::Encode { format, detail } => {
                ConversionWarning::ImageReencodeFailed { index, format, detail }
            }
        }
    }
}

/// Produce the output bytes for one image. CPU-bound.
///
/// * base64: JPEG stays JPEG (at `quality`), everything else becomes PNG.
/// * folder: the sniffed format is kept when a codec exists; formats without
///   one (JPEG 2000, HEIF, OpenEXR) are passed through untouched.
///
/// A failed encode is retried once as PNG.
fn reencode(
    bytes: &[u8],
    original: ImageFormat,
    mode: ImageHandling,
    quality: u8,
) -> Result<(ImageFormat, Vec<u8>), RenderError> {
    let target = match mode {
        ImageHandling::Base64 if original == ImageFormat::Jpeg => ImageFormat::Jpeg,
        ImageHandling::Base64 => ImageFormat::Png,
        _ => determine_output_format(original),
    };

    if mode == ImageHandling::SaveToFolder && target.codec().is_none() {
        debug!("Passing {} image through unchanged", target);
        return Ok((target, bytes.to_vec()));
    }

    let img = encode::decode(bytes).map_err(|e| RenderError::Decode(format!("cannot decode {original} image: {e}")))?;

    match encode::encode_as(&img, target, quality) {
        Ok(out) => Ok((target, out)),
        Err(e) if target != ImageFormat::Png => {
            warn!("Re-encoding as {} failed ({}), retrying as PNG", target, e);
            encode::encode_as(&img, ImageFormat::Png, quality)
                .map(|out| (ImageFormat::Png, out))
                .map_err(|e| RenderError::Encode {
                    format: target,
                    detail: e.to_string(),
                })
        }
        Err(e) => Err(RenderError::Encode {
            format: target,
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FnAnalyzer, StaticAnalyzer};
    use crate::config::AltTextTemplate;
    use crate::model::DecodedBitmap;
    use crate::pipeline::encode::tests::sample_png;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx() -> TemplateContext<'static> {
        let now = NaiveDate::from_ymd_opt(2025, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .unwrap();
        TemplateContext::new(now, "Hello", &[])
    }

    fn config(mode: ImageHandling, alt: AltTextMode) -> ConversionConfig {
        ConversionConfig::builder()
            .image_handling(mode)
            .alt_text(alt)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn base64_png_data_uri() {
        let cfg = config(ImageHandling::Base64, AltTextMode::Fixed("logo".into()));
        let pipeline = ImagePipeline::new(&cfg, ctx(), 1);
        let (results, next) = pipeline
            .process_batch(vec![ImageTask::new(sample_png(), 0)], &StaticAnalyzer::default(), 1)
            .await;
        assert_eq!(next, 2);
        let md = &results[0].rendered_markdown;
        assert!(md.starts_with("![logo](data:image/png;base64,iVBORw0KGgo"), "got {md}");
        assert!(results[0].exportable_bytes.is_none());
    }

    #[tokio::test]
    async fn base64_keeps_jpeg() {
        let img = encode::decode(&sample_png()).unwrap();
        let jpg = encode::encode_as(&img, ImageFormat::Jpeg, 90).unwrap();
        let cfg = config(ImageHandling::Base64, AltTextMode::Disabled);
        let pipeline = ImagePipeline::new(&cfg, ctx(), 1);
        let (results, _) = pipeline
            .process_batch(vec![ImageTask::new(jpg, 0)], &StaticAnalyzer::default(), 1)
            .await;
        assert!(results[0].rendered_markdown.starts_with("![Image](data:image/jpeg;base64,"));
        assert_eq!(results[0].final_format, ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn save_to_folder_paths_and_bytes() {
        let cfg = ConversionConfig::builder()
            .image_handling(ImageHandling::SaveToFolder)
            .image_folder("assets/{clipboard_preview}")
            .alt_text(AltTextMode::Analyze(AltTextTemplate::ImageOf))
            .build()
            .unwrap();
        let pipeline = ImagePipeline::new(&cfg, ctx(), 2);
        let tasks = vec![ImageTask::new(sample_png(), 0), ImageTask::new(sample_png(), 1)];
        let (results, next) = pipeline
            .process_batch(tasks, &StaticAnalyzer::new("a red square"), 4)
            .await;
        assert_eq!(next, 6);
        assert_eq!(results[0].path.as_deref(), Some("assets/hello/image4.png"));
        assert_eq!(results[1].path.as_deref(), Some("assets/hello/image5.png"));
        assert_eq!(
            results[0].rendered_markdown,
            "![Image of a red square](assets/hello/image4.png)"
        );
        let bytes = results[0].exportable_bytes.as_ref().unwrap();
        assert_eq!(detect_format(bytes), ImageFormat::Png);
    }

    #[tokio::test]
    async fn save_passes_through_formats_without_codec() {
        let mut heif = b"\x00\x00\x00\x18ftypheicmif1".to_vec();
        heif.extend_from_slice(&[0u8; 32]);
        let cfg = config(ImageHandling::SaveToFolder, AltTextMode::Disabled);
        let pipeline = ImagePipeline::new(&cfg, ctx(), 1);
        let (results, _) = pipeline
            .process_batch(vec![ImageTask::new(heif.clone(), 0)], &StaticAnalyzer::default(), 1)
            .await;
        assert_eq!(results[0].final_format, ImageFormat::Heif);
        assert_eq!(results[0].path.as_deref(), Some("./images/image1.heic"));
        assert_eq!(results[0].exportable_bytes.as_deref(), Some(heif.as_slice()));
    }

    #[tokio::test]
    async fn undecodable_bytes_render_failure_marker() {
        let cfg = config(ImageHandling::Base64, AltTextMode::Disabled);
        let pipeline = ImagePipeline::new(&cfg, ctx(), 1);
        let (results, _) = pipeline
            .process_batch(
                vec![ImageTask::new(b"definitely not an image".to_vec(), 0)],
                &StaticAnalyzer::default(),
                1,
            )
            .await;
        assert_eq!(results[0].rendered_markdown, "![Image](<image conversion failed>)");
        assert!(matches!(
            results[0].warning,
            Some(ConversionWarning::ImageExtractionFailed { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn ignore_mode_skips_analysis() {
        let cfg = config(ImageHandling::Ignore, AltTextMode::Analyze(AltTextTemplate::Objects));
        let pipeline = ImagePipeline::new(&cfg, ctx(), 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let analyzer = FnAnalyzer::new(move |_: Arc<[u8]>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { String::from("never used") }
        });
        let tasks = vec![
            ImageTask::new(sample_png(), 0),
            ImageTask::from_attachment(&Attachment::default(), 1),
        ];
        let (results, next) = pipeline.process_batch(tasks, &analyzer, 1).await;
        assert!(results.iter().all(|r| r.rendered_markdown == IGNORED_MARKER));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(next, 3);
    }

    #[tokio::test]
    async fn results_sorted_despite_reverse_latency() {
        let cfg = config(ImageHandling::Base64, AltTextMode::Analyze(AltTextTemplate::Objects));
        let pipeline = ImagePipeline::new(&cfg, ctx(), 3);
        let base = sample_png().len();
        // Trailing padding tags each image; the first one answers last.
        let analyzer = FnAnalyzer::new(move |bytes: Arc<[u8]>| async move {
            let tag = bytes.len() - base;
            tokio::time::sleep(Duration::from_millis((3 - tag as u64) * 20)).await;
            format!("image {tag}")
        });
        let mut tasks = Vec::new();
        for i in 0..3 {
            let mut png = sample_png();
            png.extend(std::iter::repeat_n(0u8, i));
            tasks.push(ImageTask::new(png, i));
        }
        let (results, _) = pipeline.process_batch(tasks, &analyzer, 1).await;
        let positions: Vec<usize> = results.iter().map(|r| r.position_index).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.index, i + 1);
            assert!(r.rendered_markdown.starts_with(&format!("![image {i}]")));
        }
    }

    #[test]
    fn extraction_order_and_failures() {
        let mut a = Attachment {
            file_wrapper: Some(vec![9, 9]),
            ..Default::default()
        };
        assert_eq!(extract_bytes(&a).unwrap(), vec![9, 9]);
        a.contents = Some(vec![1]);
        assert_eq!(extract_bytes(&a).unwrap(), vec![1]);

        let bitmap_only = Attachment {
            bitmap: Some(DecodedBitmap {
                width: 1,
                height: 1,
                rgba: vec![0, 0, 0, 255],
            }),
            ..Default::default()
        };
        let task = ImageTask::from_attachment(&bitmap_only, 0);
        assert_eq!(task.original_format, ImageFormat::Png);

        let task = ImageTask::from_attachment(&Attachment::default(), 0);
        assert!(task.extraction_error.is_some());
    }

    #[test]
    fn non_image_attachments() {
        let pdf = Attachment {
            contents: Some(vec![1, 2, 3]),
            mime_type: Some("application/pdf".into()),
            ..Default::default()
        };
        assert_eq!(non_image_reason(&pdf).as_deref(), Some("application/pdf"));
        assert_eq!(non_image_reason(&Attachment::default()).as_deref(), Some("unknown"));
        assert_eq!(non_image_reason(&Attachment::from_bytes(vec![1])), None);
    }

    #[test]
    fn alt_text_is_sanitised() {
        assert_eq!(sanitize_alt_text(" a\n[b]\tc "), "a \\[b\\] c");
    }

    #[test]
    fn link_targets_with_spaces_are_wrapped() {
        assert_eq!(link_target("my images/image1.png"), "<my images/image1.png>");
        assert_eq!(link_target("images/image1.png"), "images/image1.png");
    }
}
