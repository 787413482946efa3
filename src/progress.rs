//! Progress-callback trait for per-image conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the image pipeline works through a document. Text-only documents
//! produce a start and a completion event with zero images.
//!
//! # Example
//!
//! ```rust
//! use clip2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total_images: usize, alt_text: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {}/{}: {}", index, total_images, alt_text);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each image.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_image_start` and `on_image_complete` may be
/// called concurrently while a line's images are analysed; protect shared
/// state accordingly.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first line is processed.
    ///
    /// * `total_images` — image attachments in the document
    fn on_conversion_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called just before an image is handed to the analyzer.
    ///
    /// * `index` — 1-based global image number
    fn on_image_start(&self, index: usize, total_images: usize) {
        let _ = (index, total_images);
    }

    /// Called when an image has been rendered.
    fn on_image_complete(&self, index: usize, total_images: usize, alt_text: &str) {
        let _ = (index, total_images, alt_text);
    }

    /// Called when an image degraded to a failure marker or comment.
    fn on_image_error(&self, index: usize, total_images: usize, error: &str) {
        let _ = (index, total_images, error);
    }

    /// Called once after the Markdown has been assembled.
    ///
    /// * `success_count` — images rendered without degradation
    fn on_conversion_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
