//! Configuration types for DjVu-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so a
//! config can be cloned into concurrent page jobs and logged as a whole.

use crate::error::Djvu2PdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a DjVu-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use djvu2pdf::{ConversionConfig, TextSource};
///
/// let config = ConversionConfig::builder()
///     .dpi(300)
///     .concurrency(4)
///     .text_source(TextSource::HiddenText)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rasterisation resolution passed to `ddjvu -scale`. Range: 72–600. Default: 300.
    ///
    /// The PDF page size is derived from it (`pixels × 72 / dpi`), so the
    /// output keeps the physical size of the original scan as long as this
    /// matches the DjVu resolution.
    pub dpi: u32,

    /// Number of pages rasterised and OCR'd at the same time. Default: available CPUs.
    pub concurrency: usize,

    /// Where each page's text layer comes from. Default: [`TextSource::Auto`].
    pub text_source: TextSource,

    /// Tesseract language list (`-l`), e.g. `"eng"` or `"deu+eng"`. Default: `"eng"`.
    pub ocr_language: String,

    /// How the final PDF is put together. Default: [`AssemblyBackend::Native`].
    pub backend: AssemblyBackend,

    /// Compression of page images in the native backend. Default: JPEG, quality 85.
    pub image_encoding: ImageEncoding,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Carry the DjVu outline over as PDF bookmarks. Default: true.
    pub include_outline: bool,

    /// Directory holding `ddjvu`, `djvused`, `djvu2hocr`, `tesseract`, `pdfbeads`.
    /// If None, tools are looked up on `PATH`.
    pub bin_dir: Option<PathBuf>,

    /// Per-invocation timeout for external tools in seconds. Default: 300.
    pub tool_timeout_secs: u64,

    /// `/Title` written into the PDF document information dictionary.
    pub title: Option<String>,

    /// Optional progress callback; receives stage and per-page events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            concurrency: default_concurrency(),
            text_source: TextSource::default(),
            ocr_language: "eng".to_string(),
            backend: AssemblyBackend::default(),
            image_encoding: ImageEncoding::default(),
            pages: PageSelection::default(),
            include_outline: true,
            bin_dir: None,
            tool_timeout_secs: 300,
            title: None,
            progress_callback: None,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("text_source", &self.text_source)
            .field("ocr_language", &self.ocr_language)
            .field("backend", &self.backend)
            .field("image_encoding", &self.image_encoding)
            .field("pages", &self.pages)
            .field("include_outline", &self.include_outline)
            .field("bin_dir", &self.bin_dir)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("title", &self.title)
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
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn text_source(mut self, source: TextSource) -> Self {
        self.config.text_source = source;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn backend(mut self, backend: AssemblyBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn image_encoding(mut self, encoding: ImageEncoding) -> Self {
        self.config.image_encoding = encoding;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn include_outline(mut self, v: bool) -> Self {
        self.config.include_outline = v;
        self
    }

    pub fn bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.bin_dir = Some(dir.into());
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Djvu2PdfError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Djvu2PdfError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Djvu2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.tool_timeout_secs == 0 {
            return Err(Djvu2PdfError::InvalidConfig(
                "Tool timeout must be ≥ 1 second".into(),
            ));
        }
        if let ImageEncoding::Jpeg { quality } = c.image_encoding {
            if !(1..=100).contains(&quality) {
                return Err(Djvu2PdfError::InvalidConfig(format!(
                    "JPEG quality must be 1–100, got {quality}"
                )));
            }
        }
        if matches!(c.text_source, TextSource::Tesseract | TextSource::Auto)
            && c.ocr_language.trim().is_empty()
        {
            return Err(Djvu2PdfError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Source of the invisible text layer for each page.
///
/// | Source | Tool | Needs OCR engine |
/// |--------|------|------------------|
/// | `HiddenText` | `djvused print-txt` | no |
/// | `Djvu2Hocr` | `djvu2hocr` (ocrodjvu) | no |
/// | `Tesseract` | `tesseract … hocr` on the rendered page | yes |
/// | `Auto` | hidden text, else tesseract | only for pages without hidden text |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextSource {
    /// Read the text layer already stored in the DjVu file.
    HiddenText,
    /// Read the stored text layer through `djvu2hocr`.
    Djvu2Hocr,
    /// Run OCR on the rendered page image.
    Tesseract,
    /// Stored text when a page has it, OCR otherwise. (default)
    #[default]
    Auto,
    /// No text layer; image-only PDF.
    None,
}

impl TextSource {
    /// Tool name used in logs and [`crate::error::PageError`]s.
    pub fn name(&self) -> &'static str {
        match self {
            TextSource::HiddenText => "djvused",
            TextSource::Djvu2Hocr => "djvu2hocr",
            TextSource::Tesseract => "tesseract",
            TextSource::Auto => "auto",
            TextSource::None => "none",
        }
    }
}

/// How the final PDF is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssemblyBackend {
    /// Compose the PDF in-process with `lopdf`. (default)
    #[default]
    Native,
    /// Hand TIFF + hOCR pairs and the TOC file to `pdfbeads`.
    Pdfbeads,
}

/// Compression used for page images by the native backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEncoding {
    /// Lossy `DCTDecode`. Small, good for photos and greyscale scans.
    Jpeg { quality: u8 },
    /// Lossless `FlateDecode` of the raw pixels. Best for bitonal text scans.
    Flate,
}

impl Default for ImageEncoding {
    fn default() -> Self {
        ImageEncoding::Jpeg { quality: 85 }
    }
}

/// Specifies which pages of the DjVu document to convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ConversionConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 300);
        assert!(config.concurrency >= 1);
        assert_eq!(config.text_source, TextSource::Auto);
        assert_eq!(config.backend, AssemblyBackend::Native);
        assert_eq!(config.image_encoding, ImageEncoding::Jpeg { quality: 85 });
        assert!(config.include_outline);
    }

    #[test]
    fn builder_clamps_dpi_and_concurrency() {
        let config = ConversionConfig::builder()
            .dpi(10)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 72);
        assert_eq!(config.concurrency, 1);

        let config = ConversionConfig::builder().dpi(5000).build().unwrap();
        assert_eq!(config.dpi, 600);
    }

    #[test]
    fn rejects_bad_jpeg_quality() {
        let err = ConversionConfig::builder()
            .image_encoding(ImageEncoding::Jpeg { quality: 0 })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("JPEG quality"));
    }

    #[test]
    fn rejects_empty_ocr_language_when_ocr_can_run() {
        let err = ConversionConfig::builder()
            .text_source(TextSource::Tesseract)
            .ocr_language("  ")
            .build()
            .unwrap_err();
        assert!(matches!(err, Djvu2PdfError::InvalidConfig(_)));

        // Without OCR the language is irrelevant.
        assert!(ConversionConfig::builder()
            .text_source(TextSource::HiddenText)
            .ocr_language("")
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(ConversionConfig::builder()
            .tool_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3, 9]).to_indices(5),
            vec![0, 2]
        );
    }

    #[test]
    fn debug_hides_callback() {
        let config = ConversionConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("<dyn ConversionProgressCallback>"));
    }
}
