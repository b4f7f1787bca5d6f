//! Result types returned by the conversion entry points.

use crate::error::PageError;
use crate::toc::Bookmark;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The complete result of converting a DjVu document.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Serialised PDF bytes.
    pub pdf: Vec<u8>,
    /// Per-page results, sorted by page number.
    pub pages: Vec<PageResult>,
    /// Bookmarks carried into the PDF outline (empty when disabled or absent).
    pub bookmarks: Vec<Bookmark>,
    pub stats: ConversionStats,
}

/// Outcome for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    /// Rendered size in pixels.
    pub width: u32,
    pub height: u32,
    /// Invisible words drawn on the page.
    pub word_count: usize,
    /// Word boxes dropped by placement (outside the page, inverted, empty).
    pub skipped_words: usize,
    /// Set when the text layer could not be produced; the image is still emitted.
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn has_text(&self) -> bool {
        self.word_count > 0
    }
}

/// Aggregate statistics for a conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages written to the PDF.
    pub converted_pages: usize,
    /// Converted pages carrying a non-empty text layer.
    pub text_pages: usize,
    /// Pages whose text layer failed.
    pub text_errors: usize,
    pub total_words: usize,
    pub bookmarks: usize,
    pub pdf_bytes: usize,
    pub render_duration_ms: u64,
    pub text_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Document facts gathered without converting anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub page_count: usize,
    /// Native size of the first page, as reported by `djvused size`.
    pub first_page_size: Option<(u32, u32)>,
    /// Outline entries; empty when the document has no outline.
    pub bookmarks: Vec<Bookmark>,
}
