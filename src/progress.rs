//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages and finishes each page.
//!
//! # Example
//!
//! ```rust
//! use djvu2pdf::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     words: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, word_count: usize) {
//!         self.words.fetch_add(word_count, Ordering::SeqCst);
//!         eprintln!("Page {}/{} has {} words", page_num, total_pages, word_count);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { words: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Coarse pipeline stages, reported in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Rasterising,
    ExtractingText,
    Outline,
    Assembling,
    Finalising,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Rasterising => "Rendering pages",
            Stage::ExtractingText => "Extracting text",
            Stage::Outline => "Reading outline",
            Stage::Assembling => "Assembling PDF",
            Stage::Finalising => "Finalising",
        };
        f.write_str(s)
    }
}

/// Called by the conversion pipeline as it runs.
///
/// Implementations must be `Send + Sync`: pages are processed concurrently
/// and `on_page_*` may be called from different tasks at the same time.
/// All methods have default no-op implementations.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after page selection, before anything is rendered.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when the pipeline enters a new stage.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a page's rasterisation begins (1-indexed `page_num`).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's image and text layer are ready.
    ///
    /// `word_count` is the number of invisible words that will be drawn.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, word_count: usize) {
        let _ = (page_num, total_pages, word_count);
    }

    /// Called when a page's text layer failed. The page is still emitted.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the PDF has been assembled.
    ///
    /// `text_pages` counts pages that carry a non-empty text layer.
    fn on_conversion_complete(&self, total_pages: usize, text_pages: usize) {
        let _ = (total_pages, text_pages);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
