//! Image analyzers: bytes in, a short description out.
//!
//! The engine only knows the [`ImageAnalyzer`] contract. An analyzer never
//! fails from the engine's point of view: it returns the best description it
//! has, possibly a fallback, and the engine wraps it in the alt-text template.
//!
//! | Analyzer | Use |
//! |----------|-----|
//! | [`StaticAnalyzer`] | Same text for every image (tests, offline runs) |
//! | [`FnAnalyzer`]     | Adapt any async closure |
//! | [`LlmImageAnalyzer`] | Vision model via `edgequake-llm`, with retry/backoff and a timeout |

use crate::config::AnalyzerConfig;
use crate::error::Clip2MdError;
use crate::pipeline::encode;
use crate::prompts::{clean_description, ALT_TEXT_REQUEST, DEFAULT_ALT_TEXT_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Produces a description of an image for its alt text.
///
/// Called concurrently for the images of one line, so implementations must
/// be `Send + Sync`.
pub trait ImageAnalyzer: Send + Sync {
    fn analyze(&self, image: Arc<[u8]>) -> BoxFuture<'_, String>;
}

/// Returns the same description for every image.
#[derive(Debug, Clone)]
pub struct StaticAnalyzer {
    text: String,
}

impl StaticAnalyzer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for StaticAnalyzer {
    fn default() -> Self {
        Self::new("Image")
    }
}

impl ImageAnalyzer for StaticAnalyzer {
    fn analyze(&self, _image: Arc<[u8]>) -> BoxFuture<'_, String> {
        futures::future::ready(self.text.clone()).boxed()
    }
}

/// Adapts an async closure into an [`ImageAnalyzer`].
///
/// ```rust
/// use clip2md::FnAnalyzer;
/// use std::sync::Arc;
///
/// let analyzer = FnAnalyzer::new(|bytes: Arc<[u8]>| async move { format!("{} bytes", bytes.len()) });
/// ```
pub struct FnAnalyzer<F> {
    f: F,
}

impl<F> FnAnalyzer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> ImageAnalyzer for FnAnalyzer<F>
where
    F: Fn(Arc<[u8]>) -> Fut + Send + Sync,
    Fut: Future<Output = String> + Send + 'static,
{
    fn analyze(&self, image: Arc<[u8]>) -> BoxFuture<'_, String> {
        (self.f)(image).boxed()
    }
}

/// Vision-model analyzer backed by an `edgequake-llm` provider.
///
/// ## Retry strategy
///
/// Transient API failures (429, 503, timeouts) are retried with exponential
/// backoff: `retry_backoff_ms * 2^(attempt-1)`. Every attempt is bounded by
/// `api_timeout_secs`. When all attempts fail the configured fallback text is
/// returned and the failure is logged, never propagated.
pub struct LlmImageAnalyzer {
    provider: Arc<dyn LLMProvider>,
    config: AnalyzerConfig,
}

impl LlmImageAnalyzer {
    /// Resolve a provider from `config` (see [`resolve_provider`]).
    pub fn from_config(config: AnalyzerConfig) -> Result<Self, Clip2MdError> {
        let provider = resolve_provider(&config)?;
        Ok(Self { provider, config })
    }

    /// Use an already constructed provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: AnalyzerConfig) -> Self {
        Self { provider, config }
    }

    async fn describe(&self, image: Arc<[u8]>) -> String {
        let start = Instant::now();
        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_ALT_TEXT_PROMPT);

        let image_data = encode::encode_for_vision(&image);
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(ALT_TEXT_REQUEST, vec![image_data]),
        ];
        let options = build_options(&self.config);
        let call_timeout = Duration::from_secs(self.config.api_timeout_secs.max(1));

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Alt text: retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(call_timeout, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    let description = clean_description(&response.content);
                    debug!(
                        "Alt text: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    if description.is_empty() {
                        warn!("Alt text: provider returned an empty description");
                    }
                    return description;
                }
                Ok(Err(e)) => {
                    warn!("Alt text: attempt {} failed — {}", attempt + 1, e);
                }
                Err(_) => {
                    warn!(
                        "Alt text: attempt {} timed out after {}s",
                        attempt + 1,
                        call_timeout.as_secs()
                    );
                }
            }
        }

        warn!(
            "Alt text: all {} attempt(s) failed, using fallback",
            self.config.max_retries + 1
        );
        self.config.fallback_text.clone()
    }
}

impl ImageAnalyzer for LlmImageAnalyzer {
    fn analyze(&self, image: Arc<[u8]>) -> BoxFuture<'_, String> {
        self.describe(image).boxed()
    }
}

fn build_options(config: &AnalyzerConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Pick the vision provider for alt text.
///
/// A pre-built provider wins. Otherwise `provider_name` and `model` must be
/// given together; with neither, the provider is auto-detected from the
/// environment (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
pub fn resolve_provider(config: &AnalyzerConfig) -> Result<Arc<dyn LLMProvider>, Clip2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    match (config.provider_name.as_deref(), config.model.as_deref()) {
        (Some(name), Some(model)) => ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            Clip2MdError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: e.to_string(),
            }
        }),
        (Some(name), None) => Err(Clip2MdError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: "a vision model must be named along with the provider".to_string(),
        }),
        (None, Some(model)) => Err(Clip2MdError::ProviderNotConfigured {
            provider: "unspecified".to_string(),
            hint: format!("model {model:?} was given without a provider"),
        }),
        (None, None) => ProviderFactory::from_env()
            .map(|(llm, _embedding)| llm)
            .map_err(|e| Clip2MdError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!("no vision provider found in the environment ({e})"),
            }),
    }
}
