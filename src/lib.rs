//! # djvu2pdf
//!
//! Convert DjVu documents to searchable PDF.
//!
//! Every page is rasterised with DjVuLibre, its words are placed on an
//! invisible text layer (render mode 3) exactly over the scanned glyphs, and
//! the DjVu outline becomes the PDF bookmark tree. The result looks like the
//! scan but can be searched, selected and copied.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DjVu
//!  │
//!  ├─ 1. Input     validate the AT&TFORM header, count pages (djvused)
//!  ├─ 2. Render    one TIFF per page (ddjvu), concurrent
//!  ├─ 3. Text      stored text layer (djvused / djvu2hocr) or OCR (tesseract)
//!  ├─ 4. Overlay   word boxes → invisible draw instructions
//!  ├─ 5. Outline   print-outline → flattened bookmarks
//!  └─ 6. Assemble  lopdf (native) or pdfbeads
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use djvu2pdf::{convert_to_file, ConversionConfig, TextSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .dpi(300)
//!         .text_source(TextSource::Auto)
//!         .build()?;
//!     let stats = convert_to_file("book.djvu", "book.pdf", &config).await?;
//!     eprintln!("{} pages, {} words", stats.converted_pages, stats.total_words);
//!     Ok(())
//! }
//! ```
//!
//! The pure parts work without any external tool:
//!
//! ```rust
//! let bookmarks = djvu2pdf::toc::parse_outline(
//!     r##"(bookmarks ("Intro" "#1") ("Chapter 1" "#5" ("Section" "#7")))"##,
//! ).unwrap();
//! assert_eq!(
//!     djvu2pdf::toc::format_toc(&bookmarks),
//!     "\"Intro\" \"1\"\n\"Chapter 1\" \"5\"\n\t\"Section\" \"7\""
//! );
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `djvu2pdf` binary (clap + anyhow + tracing-subscriber + indicatif + serde_json) |
//!
//! ```toml
//! djvu2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Needed for |
//! |------|------------|
//! | `ddjvu`, `djvused` | always (DjVuLibre) |
//! | `tesseract` | [`TextSource::Tesseract`], fallback of [`TextSource::Auto`] |
//! | `djvu2hocr` | [`TextSource::Djvu2Hocr`] |
//! | `pdfbeads` | [`AssemblyBackend::Pdfbeads`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod hocr;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod progress;
pub mod sexpr;
pub mod toc;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AssemblyBackend, ConversionConfig, ConversionConfigBuilder, ImageEncoding, PageSelection,
    TextSource,
};
pub use convert::{
    convert, convert_from_bytes, convert_sync, convert_to_file, inspect, read_outline,
};
pub use error::{Djvu2PdfError, PageError, ToolError};
pub use output::{ConversionOutput, ConversionStats, DocumentInfo, PageResult};
pub use overlay::{place_words, DrawInstruction, PageGeometry, TextLayer, WordBox};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use toc::{format_toc, Bookmark, TocParseError};
