//! CLI binary for clip2md.
//!
//! A thin shim over the library crate: reads a JSON rich document (plus
//! optional RTF and plain-text captures), maps CLI flags to
//! `ConversionConfig`, and prints or writes the results.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use clip2md::{
    convert, AltTextMode, AltTextTemplate, AnalyzerConfig, ConversionConfig, ConversionInput,
    ConversionProgressCallback, FrontMatterField, ImageAnalyzer, ImageHandling, LlmImageAnalyzer,
    ProcessingResult, ProgressCallback, RichDocument, StaticAnalyzer,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar over the document's images. Images of one line complete out
/// of order, so start times are tracked per image number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} images  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_images: usize) {
        self.bar.set_length(total_images as u64);
        if total_images > 0 {
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("Converting document with {total_images} image(s)…"))
            ));
        }
    }

    fn on_image_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(format!("image {index}"));
    }

    fn on_image_complete(&self, index: usize, total: usize, alt_text: &str) {
        let secs = self.elapsed_secs(index);
        let alt: String = alt_text.chars().take(60).collect();
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            dim(&alt),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_images: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_images.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} converted, {} image(s)",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images converted  ({} degraded)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown to stdout, images ignored
  clip2md clipboard.json

  # Recover tables from the RTF capture and checkbox state from plain text
  clip2md clipboard.json --markup clipboard.rtf --plain-text clipboard.txt

  # Embed images as data URIs with fixed alt text
  clip2md clipboard.json --images base64 --alt-text fixed --fixed-alt-text "Screenshot"

  # Export images next to the Markdown, alt text from a vision model
  clip2md clipboard.json --images folder --image-folder "assets/{date}" -o notes/

  # Front matter from a JSON field list
  clip2md clipboard.json --front-matter fields.json -o notes/

  # JSON summary (markdown, assets, warnings, stats)
  clip2md clipboard.json --json

FRONT MATTER FILE:
  [{"name": "title", "type": "string", "value": "My note"},
   {"name": "tags",  "type": "tag",    "value": "ios, swift"},
   {"name": "created", "type": "current_datetime", "value": ""}]

TEMPLATE VARIABLES (image folder, file name):
  {date}               2025-07-01
  {time}               2025-07-01_14-03-09
  {clipboard_preview}  first 20 characters of the document, lowercased
  {<field>}            value of a front-matter field

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_PROVIDER      Provider for --provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Vision model for --model (required with --provider)
"#;

/// Convert rich clipboard documents to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "clip2md",
    version,
    about = "Convert rich clipboard documents to Markdown",
    long_about = "Convert a rich clipboard document (styled runs and attachments, as JSON) to \
Markdown. Tables are recovered from an optional RTF capture, checkbox state from an optional \
plain-text capture, and image alt text from any vision model supported by edgequake-llm.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON document file, or `-` for stdin.
    input: PathBuf,

    /// RTF rendition of the same document (table geometry).
    #[arg(long, env = "CLIP2MD_MARKUP")]
    markup: Option<PathBuf>,

    /// Plain-text rendition of the same document (checkbox state).
    #[arg(long, env = "CLIP2MD_PLAIN_TEXT")]
    plain_text: Option<PathBuf>,

    /// JSON array of front-matter fields.
    #[arg(long, env = "CLIP2MD_FRONT_MATTER")]
    front_matter: Option<PathBuf>,

    /// Write Markdown and exported images into this directory instead of stdout.
    #[arg(short, long, env = "CLIP2MD_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// What to do with images.
    #[arg(long, env = "CLIP2MD_IMAGES", value_enum, default_value = "ignore")]
    images: ImagesArg,

    /// Folder template for exported images (with `--images folder`).
    #[arg(long, env = "CLIP2MD_IMAGE_FOLDER", default_value = "./images")]
    image_folder: String,

    /// JPEG quality when re-encoding (1–100).
    #[arg(long, env = "CLIP2MD_JPEG_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// How alt text is produced.
    #[arg(long, env = "CLIP2MD_ALT_TEXT", value_enum, default_value = "analyze")]
    alt_text: AltTextArg,

    /// Phrasing around the model's description (with `--alt-text analyze`).
    #[arg(long, env = "CLIP2MD_ALT_TEMPLATE", value_enum, default_value = "image-of")]
    alt_template: AltTemplateArg,

    /// Custom phrasing containing `{objects}`; overrides `--alt-template`.
    #[arg(long, env = "CLIP2MD_ALT_TEMPLATE_CUSTOM")]
    alt_template_custom: Option<String>,

    /// Alt text for every image (with `--alt-text fixed`).
    #[arg(long, env = "CLIP2MD_FIXED_ALT_TEXT", default_value = "Image")]
    fixed_alt_text: String,

    /// Alt text when generation is disabled or fails.
    #[arg(long, env = "CLIP2MD_DEFAULT_ALT_TEXT", default_value = "Image")]
    default_alt_text: String,

    /// Template for the Markdown file name.
    #[arg(long, env = "CLIP2MD_FILENAME", default_value = "note_{date}_{clipboard_preview}")]
    filename_format: String,

    /// Concurrent alt-text requests per line.
    #[arg(short, long, env = "CLIP2MD_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Vision model ID; required with `--provider`.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom alt-text system prompt.
    #[arg(long, env = "CLIP2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Retries per image on LLM failure.
    #[arg(long, env = "CLIP2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-image LLM call timeout in seconds.
    #[arg(long, env = "CLIP2MD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Output a JSON summary instead of Markdown.
    #[arg(long, env = "CLIP2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CLIP2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CLIP2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CLIP2MD_QUIET")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ImagesArg {
    Ignore,
    Base64,
    Folder,
}

impl From<ImagesArg> for ImageHandling {
    fn from(v: ImagesArg) -> Self {
        match v {
            ImagesArg::Ignore => ImageHandling::Ignore,
            ImagesArg::Base64 => ImageHandling::Base64,
            ImagesArg::Folder => ImageHandling::SaveToFolder,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum AltTextArg {
    Disabled,
    Fixed,
    Analyze,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AltTemplateArg {
    ImageOf,
    ThisShows,
    Objects,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Read inputs ──────────────────────────────────────────────────────
    let input = read_input(&cli).await?;

    // ── Build config and analyzer ────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let analyzer = build_analyzer(&cli, &config).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let result = convert(&input, &config, analyzer.as_ref())
        .await
        .context("Conversion failed")?;

    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }

    if let Some(ref dir) = cli.output_dir {
        let written = write_bundle(dir, &result).await?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "{}  {} image(s)  {}ms  →  {}",
                if result.warnings.is_empty() {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                result.assets.len(),
                result.stats.total_duration_ms,
                bold(&written.display().to_string()),
            );
        }
    }

    if cli.json {
        let summary = serde_json::json!({
            "markdown": result.markdown,
            "suggested_filename": result.suggested_filename,
            "output_kind": result.output_kind,
            "assets": result.asset_files().map(|(path, _)| path).collect::<Vec<_>>(),
            "warnings": result.warnings,
            "stats": result.stats,
        });
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output_dir.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "{}",
            dim(&format!(
                "{} line(s), {}/{} image(s), {} table(s), {} warning(s) in {}ms",
                result.stats.total_lines,
                result.stats.images_converted,
                result.stats.total_images,
                result.stats.tables,
                result.warnings.len(),
                result.stats.total_duration_ms
            ))
        );
    }

    Ok(())
}

async fn read_input(cli: &Cli) -> Result<ConversionInput> {
    let json = if cli.input.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read document from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(&cli.input)
            .await
            .with_context(|| format!("Failed to read document from {:?}", cli.input))?
    };
    let document = RichDocument::from_json(&json).context("Failed to parse document")?;

    let mut input = ConversionInput::new(document);
    if let Some(ref path) = cli.markup {
        input.markup = Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read markup from {:?}", path))?,
        );
    }
    if let Some(ref path) = cli.plain_text {
        input.plain_text = Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read plain text from {:?}", path))?,
        );
    }
    Ok(input)
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let front_matter: Vec<FrontMatterField> = if let Some(ref path) = cli.front_matter {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read front matter from {:?}", path))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid front-matter field list in {:?}", path))?
    } else {
        Vec::new()
    };

    let template = match cli.alt_template_custom {
        Some(ref custom) => AltTextTemplate::Custom(custom.clone()),
        None => match cli.alt_template {
            AltTemplateArg::ImageOf => AltTextTemplate::ImageOf,
            AltTemplateArg::ThisShows => AltTextTemplate::ThisShows,
            AltTemplateArg::Objects => AltTextTemplate::Objects,
        },
    };
    let alt_text = match cli.alt_text {
        AltTextArg::Disabled => AltTextMode::Disabled,
        AltTextArg::Fixed => AltTextMode::Fixed(cli.fixed_alt_text.clone()),
        AltTextArg::Analyze => AltTextMode::Analyze(template),
    };

    let mut builder = ConversionConfig::builder()
        .image_handling(cli.images.into())
        .image_folder(cli.image_folder.clone())
        .jpeg_quality(cli.jpeg_quality)
        .alt_text(alt_text)
        .default_alt_text(cli.default_alt_text.clone())
        .front_matter(front_matter)
        .output_filename_format(cli.filename_format.clone())
        .analysis_concurrency(cli.concurrency);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// A vision-model analyzer when alt text is generated for real images,
/// otherwise a fixed one that is never consulted.
async fn build_analyzer(cli: &Cli, config: &ConversionConfig) -> Result<Box<dyn ImageAnalyzer>> {
    let needs_model = config.image_handling != ImageHandling::Ignore
        && matches!(config.alt_text, AltTextMode::Analyze(_));
    if !needs_model {
        return Ok(Box::new(StaticAnalyzer::new(config.default_alt_text.clone())));
    }

    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let analyzer_config = AnalyzerConfig {
        model: cli.model.clone(),
        provider_name: cli.provider.clone(),
        max_retries: cli.max_retries,
        api_timeout_secs: cli.api_timeout,
        system_prompt,
        fallback_text: config.default_alt_text.clone(),
        ..Default::default()
    };
    let analyzer = LlmImageAnalyzer::from_config(analyzer_config)
        .context("No vision provider available; use --alt-text fixed or --alt-text disabled to run offline")?;
    Ok(Box::new(analyzer))
}

/// Write the Markdown and every exported image under `dir`.
///
/// Each file is written to a temporary sibling first and renamed into place.
async fn write_bundle(dir: &Path, result: &ProcessingResult) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    for (relative, bytes) in result.asset_files() {
        let target = dir.join(checked_relative(relative)?);
        write_atomic(&target, bytes).await?;
    }

    let md_path = dir.join(checked_relative(&result.suggested_filename)?);
    write_atomic(&md_path, result.markdown.as_bytes()).await?;
    Ok(md_path)
}

/// Reject paths that would escape the output directory.
fn checked_relative(path: &str) -> Result<&Path> {
    let p = Path::new(path);
    if p.components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        bail!("Refusing to write outside the output directory: {path:?}");
    }
    Ok(p)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move {:?} into place", path))?;
    Ok(())
}
