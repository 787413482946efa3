//! Configuration types for rich-document → Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. A config is immutable for the duration
//! of one conversion and cheap to clone across tasks.
//!
//! The LLM-backed alt-text analyzer has its own knobs in [`AnalyzerConfig`];
//! the engine itself never talks to a provider.

use crate::error::Clip2MdError;
use crate::pipeline::front_matter::FrontMatterField;
use crate::progress::ProgressCallback;
use crate::template;
use chrono::{Local, NaiveDateTime};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use clip2md::{ConversionConfig, ImageHandling};
///
/// let config = ConversionConfig::builder()
///     .image_handling(ImageHandling::SaveToFolder)
///     .image_folder("assets/{date}")
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// What happens to image attachments. Default: [`ImageHandling::Ignore`].
    pub image_handling: ImageHandling,

    /// Folder template for exported images. Default: `./images`.
    ///
    /// Supports `{date}`, `{time}`, `{clipboard_preview}` and front-matter
    /// field names. Only used with [`ImageHandling::SaveToFolder`].
    pub image_folder: String,

    /// JPEG quality (1–100) when a JPEG is re-encoded. Default: 80.
    pub jpeg_quality: u8,

    /// How alt text is produced. Default: `Analyze(ImageOf)`.
    pub alt_text: AltTextMode,

    /// Alt text used when generation is disabled or yields nothing. Default: `Image`.
    pub default_alt_text: String,

    /// Front matter prepended to the document. Default: none.
    pub front_matter: Vec<FrontMatterField>,

    /// Template for the suggested Markdown file name. Default: `note_{date}_{clipboard_preview}`.
    pub output_filename_format: String,

    /// Maximum concurrent analyzer calls within one line. Default: 8.
    pub analysis_concurrency: usize,

    /// Fixed clock for date templates. Default: the local time at conversion start.
    pub clock: Option<NaiveDateTime>,

    /// Optional per-image progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            image_handling: ImageHandling::default(),
            image_folder: "./images".to_string(),
            jpeg_quality: 80,
            alt_text: AltTextMode::default(),
            default_alt_text: "Image".to_string(),
            front_matter: Vec::new(),
            output_filename_format: "note_{date}_{clipboard_preview}".to_string(),
            analysis_concurrency: 8,
            clock: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("image_handling", &self.image_handling)
            .field("image_folder", &self.image_folder)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("alt_text", &self.alt_text)
            .field("default_alt_text", &self.default_alt_text)
            .field("front_matter", &self.front_matter.len())
            .field("output_filename_format", &self.output_filename_format)
            .field("analysis_concurrency", &self.analysis_concurrency)
            .field("clock", &self.clock)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The clock reading used for every template in one conversion.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.unwrap_or_else(|| Local::now().naive_local())
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn image_handling(mut self, mode: ImageHandling) -> Self {
        self.config.image_handling = mode;
        self
    }

    pub fn image_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.image_folder = folder.into();
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn alt_text(mut self, mode: AltTextMode) -> Self {
        self.config.alt_text = mode;
        self
    }

    pub fn default_alt_text(mut self, text: impl Into<String>) -> Self {
        self.config.default_alt_text = text.into();
        self
    }

    pub fn front_matter(mut self, fields: Vec<FrontMatterField>) -> Self {
        self.config.front_matter = fields;
        self
    }

    pub fn output_filename_format(mut self, format: impl Into<String>) -> Self {
        self.config.output_filename_format = format.into();
        self
    }

    pub fn analysis_concurrency(mut self, n: usize) -> Self {
        self.config.analysis_concurrency = n.max(1);
        self
    }

    pub fn clock(mut self, now: NaiveDateTime) -> Self {
        self.config.clock = Some(now);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Clip2MdError> {
        let c = &self.config;
        if c.analysis_concurrency == 0 {
            return Err(Clip2MdError::InvalidConfig(
                "Analysis concurrency must be ≥ 1".into(),
            ));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(Clip2MdError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.image_handling == ImageHandling::SaveToFolder {
            template::validate_image_folder(&c.image_folder)?;
        }
        template::validate_output_filename(&c.output_filename_format, &c.front_matter, c.now())?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What to do with image attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageHandling {
    /// Replace every image with `<!-- Image ignored -->`. (default)
    #[default]
    Ignore,
    /// Embed images as `data:` URIs.
    Base64,
    /// Export images next to the Markdown and link them by relative path.
    SaveToFolder,
}

/// Phrasing wrapped around the analyzer's description.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltTextTemplate {
    /// `Image of {objects}` (default)
    #[default]
    ImageOf,
    /// `This picture shows {objects}`
    ThisShows,
    /// `{objects}`
    Objects,
    /// Any text containing `{objects}`.
    Custom(String),
}

impl AltTextTemplate {
    pub fn pattern(&self) -> &str {
        match self {
            AltTextTemplate::ImageOf => "Image of {objects}",
            AltTextTemplate::ThisShows => "This picture shows {objects}",
            AltTextTemplate::Objects => "{objects}",
            AltTextTemplate::Custom(p) => p,
        }
    }

    /// Substitute the analyzer output; an empty description becomes `content`.
    pub fn apply(&self, objects: &str) -> String {
        let objects = objects.trim();
        let objects = if objects.is_empty() { "content" } else { objects };
        self.pattern().replace("{objects}", objects)
    }
}

/// How alt text is produced for each image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltTextMode {
    /// Always the configured default alt text; the analyzer is never called.
    Disabled,
    /// The same text for every image.
    Fixed(String),
    /// Ask the analyzer and wrap its answer in a template.
    Analyze(AltTextTemplate),
}

impl Default for AltTextMode {
    fn default() -> Self {
        AltTextMode::Analyze(AltTextTemplate::default())
    }
}

// ── Analyzer ─────────────────────────────────────────────────────────────

/// Settings for [`crate::analyzer::LlmImageAnalyzer`].
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Vision model identifier. Required together with `provider_name`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// With neither this nor `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens per description. Default: 200.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient API failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses the built-in alt-text prompt.
    pub system_prompt: Option<String>,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Returned when every attempt fails. Default: `Image`.
    pub fallback_text: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 200,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
            api_timeout_secs: 60,
            fallback_text: "Image".to_string(),
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}
