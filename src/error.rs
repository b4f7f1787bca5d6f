//! Error types for the djvu2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Djvu2PdfError`] is **fatal**: the conversion cannot proceed at all
//!   (missing input, a page that cannot be rasterised, a malformed outline,
//!   the PDF cannot be assembled). Returned as `Err(Djvu2PdfError)` from the
//!   top-level `convert*` functions.
//!
//! * [`PageError`] is **non-fatal**: the text layer of a single page could not
//!   be extracted. The page is still emitted with its image, and the error is
//!   stored inside [`crate::output::PageResult`].
//!
//! Parser- and tool-level errors ([`TocParseError`], [`ToolError`]) are
//! wrapped into [`Djvu2PdfError`] when they are fatal and flattened into a
//! [`PageError`] detail string when they are not.

use crate::toc::TocParseError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the djvu2pdf library.
#[derive(Debug, Error)]
pub enum Djvu2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("DjVu file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a DjVu document.
    #[error("File is not a valid DjVu document: '{path}'\nFirst bytes: {magic:?}")]
    NotADjvu { path: PathBuf, magic: [u8; 8] },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Page errors ───────────────────────────────────────────────────────
    /// ddjvu failed or produced no image for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The rendered page image could not be decoded or re-encoded.
    #[error("Image processing failed for page {page}: {source}")]
    ImageDecode {
        page: usize,
        #[source]
        source: image::ImageError,
    },

    // ── Outline errors ────────────────────────────────────────────────────
    /// The document outline is present but malformed.
    #[error("Malformed document outline: {0}")]
    Outline(#[from] TocParseError),

    // ── Tool errors ───────────────────────────────────────────────────────
    /// An external tool needed for a document-wide step failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The final PDF could not be built.
    #[error("PDF assembly failed: {0}")]
    AssemblyFailed(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure running one of the external DjVuLibre / OCR tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executable could not be spawned.
    #[error("'{tool}' could not be started: {source}\nInstall it or point --bin-dir at its directory.")]
    NotFound {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but exited unsuccessfully.
    #[error("'{tool}' failed ({status}): {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The tool did not finish within the configured timeout.
    #[error("'{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// The tool started but its output could not be collected.
    #[error("'{tool}' failed while running: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Name of the tool that failed.
    pub fn tool(&self) -> &str {
        match self {
            ToolError::NotFound { tool, .. }
            | ToolError::Failed { tool, .. }
            | ToolError::Timeout { tool, .. }
            | ToolError::Io { tool, .. } => tool,
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page's text layer
/// fails. The page keeps its image and simply carries no text.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The configured text source failed or returned unreadable data.
    #[error("Page {page}: text layer from {source_name} unavailable: {detail}")]
    TextLayer {
        page: usize,
        source_name: String,
        detail: String,
    },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::TextLayer { page, .. } => *page,
        }
    }
}
