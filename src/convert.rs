//! Conversion entry points.
//!
//! The pipeline runs in two concurrent phases followed by two sequential
//! ones:
//!
//! 1. render every selected page (`ddjvu`), bounded by `concurrency`;
//! 2. extract and place each page's text layer, bounded the same way;
//! 3. read the outline;
//! 4. assemble the PDF.
//!
//! Rendering failures abort the conversion. Text failures are recorded per
//! page and the page is emitted image-only.

use crate::config::{AssemblyBackend, ConversionConfig, PageSelection};
use crate::error::{Djvu2PdfError, PageError};
use crate::output::{ConversionOutput, ConversionStats, DocumentInfo, PageResult};
use crate::overlay::{self, PageGeometry, TextLayer, WordBox};
use crate::pipeline::assemble;
use crate::pipeline::render::{self, RenderedPage};
use crate::pipeline::tools::ToolRunner;
use crate::pipeline::{input, pdfbeads, text};
use crate::progress::Stage;
use crate::toc::{self, Bookmark};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Text-stage result for one page.
struct PageText {
    page: RenderedPage,
    words: Vec<WordBox>,
    layer: TextLayer,
    error: Option<PageError>,
}

/// Convert a DjVu file to a searchable PDF held in memory.
///
/// # Errors
/// Returns `Err(Djvu2PdfError)` only for fatal errors:
/// - file not found, unreadable, or not a DjVu document
/// - page selection outside the document
/// - a page that cannot be rasterised
/// - a malformed outline
/// - the PDF cannot be assembled
///
/// Text-layer failures are reported in [`PageResult::error`] instead.
pub async fn convert(
    input_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Djvu2PdfError> {
    let total_start = Instant::now();
    let path = input::validate_input(input_path)?;
    info!(
        "Starting conversion: {} (text: {}, dpi: {})",
        path.display(),
        config.text_source.name(),
        config.dpi
    );

    let runner = ToolRunner::from_config(config);
    let cb = config.progress_callback.as_ref();

    // ── Step 1: Page count and selection ─────────────────────────────────
    let total_pages = render::page_count(&runner, &path).await?;
    info!("DjVu has {} pages", total_pages);

    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(Djvu2PdfError::PageOutOfRange {
            page: first_requested(&config.pages),
            total: total_pages,
        });
    }
    let selected: Vec<usize> = page_indices.iter().map(|i| i + 1).collect();
    let selected_count = selected.len();
    debug!("Selected {} pages for conversion", selected_count);

    if let Some(cb) = cb {
        cb.on_conversion_start(selected_count);
    }

    let work_dir = tempfile::TempDir::new()
        .map_err(|e| Djvu2PdfError::Internal(format!("Failed to create work directory: {e}")))?;

    // ── Step 2: Rasterise ────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage(Stage::Rasterising);
    }
    let render_start = Instant::now();
    let mut rendered: Vec<RenderedPage> = stream::iter(selected.iter().copied())
        .map(|page_num| {
            let runner = &runner;
            let path = &path;
            let work_dir = work_dir.path();
            async move {
                if let Some(cb) = cb {
                    cb.on_page_start(page_num, selected_count);
                }
                render::render_page(runner, path, work_dir, page_num, total_pages, config.dpi).await
            }
        })
        .buffer_unordered(config.concurrency)
        .try_collect()
        .await?;
    rendered.sort_by_key(|p| p.page_num);
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", rendered.len(), render_duration_ms);

    // ── Step 3: Text layer ───────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage(Stage::ExtractingText);
    }
    let text_start = Instant::now();
    let mut texts: Vec<PageText> = stream::iter(rendered)
        .map(|page| {
            let runner = &runner;
            let path = &path;
            async move { page_text(runner, path, page, config, selected_count).await }
        })
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    texts.sort_by_key(|t| t.page.page_num);
    let text_duration_ms = text_start.elapsed().as_millis() as u64;

    // ── Step 4: Outline ──────────────────────────────────────────────────
    let bookmarks = if config.include_outline {
        if let Some(cb) = cb {
            cb.on_stage(Stage::Outline);
        }
        fetch_outline(&runner, &path).await?
    } else {
        Vec::new()
    };
    let outline = assemble::resolve_outline(&bookmarks, &selected);

    // ── Step 5: Assemble ─────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage(Stage::Assembling);
    }
    let assemble_start = Instant::now();
    let pages: Vec<PageResult> = texts.iter().map(page_result).collect();

    let pdf = match config.backend {
        AssemblyBackend::Native => {
            let layers: Vec<(RenderedPage, TextLayer)> = texts
                .into_iter()
                .map(|t| (t.page, t.layer))
                .collect();
            let config = config.clone();
            let outline = outline.clone();
            tokio::task::spawn_blocking(move || assemble::assemble_native(&layers, &outline, &config))
                .await
                .map_err(|e| Djvu2PdfError::Internal(format!("Assembly task panicked: {e}")))??
        }
        AssemblyBackend::Pdfbeads => {
            let words: Vec<(RenderedPage, Vec<WordBox>)> = texts
                .into_iter()
                .map(|t| (t.page, t.words))
                .collect();
            pdfbeads::assemble_pdfbeads(&runner, work_dir.path(), &words, &outline).await?
        }
    };
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;

    // ── Step 6: Stats ────────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage(Stage::Finalising);
    }
    let text_pages = pages.iter().filter(|p| p.has_text()).count();
    let stats = ConversionStats {
        total_pages,
        converted_pages: pages.len(),
        text_pages,
        text_errors: pages.iter().filter(|p| p.error.is_some()).count(),
        total_words: pages.iter().map(|p| p.word_count).sum(),
        bookmarks: outline.len(),
        pdf_bytes: pdf.len(),
        render_duration_ms,
        text_duration_ms,
        assemble_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {} pages ({} with text), {} bookmarks, {}ms total",
        stats.converted_pages, stats.text_pages, stats.bookmarks, stats.total_duration_ms
    );

    if let Some(cb) = cb {
        cb.on_conversion_complete(selected_count, text_pages);
    }

    Ok(ConversionOutput {
        pdf,
        pages,
        bookmarks,
        stats,
    })
}

/// Convert a DjVu file and write the PDF directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Djvu2PdfError> {
    let output = convert(input_path, config).await?;
    let path = output_path.as_ref();
    let write_err = |source: std::io::Error| Djvu2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &output.pdf).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Djvu2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Djvu2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_path, config))
}

/// Convert DjVu bytes held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed when the
/// conversion returns.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Djvu2PdfError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".djvu")
        .tempfile()
        .map_err(|e| Djvu2PdfError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Djvu2PdfError::Internal(format!("tempfile write: {e}")))?;
    convert(tmp.path(), config).await
}

/// Read page count, first page size and outline without converting.
pub async fn inspect(
    input_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<DocumentInfo, Djvu2PdfError> {
    let path = input::validate_input(input_path)?;
    let runner = ToolRunner::from_config(config);
    let file_size = tokio::fs::metadata(&path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    let page_count = render::page_count(&runner, &path).await?;
    let first_page_size = if page_count > 0 {
        render::native_size(&runner, &path, 1).await
    } else {
        None
    };
    let bookmarks = fetch_outline(&runner, &path).await?;
    Ok(DocumentInfo {
        path,
        file_size,
        page_count,
        first_page_size,
        bookmarks,
    })
}

/// Read and parse the document outline.
///
/// A missing outline is an empty list; a malformed one is an error.
pub async fn read_outline(
    input_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<Vec<Bookmark>, Djvu2PdfError> {
    let path = input::validate_input(input_path)?;
    fetch_outline(&ToolRunner::from_config(config), &path).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn fetch_outline(runner: &ToolRunner, path: &Path) -> Result<Vec<Bookmark>, Djvu2PdfError> {
    let raw = match runner
        .run_text(
            "djvused",
            [OsStr::new("-u"), OsStr::new("-e"), OsStr::new("print-outline"), path.as_os_str()],
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Could not read outline, continuing without bookmarks: {e}");
            return Ok(Vec::new());
        }
    };
    let bookmarks = toc::parse_outline(&raw)?;
    debug!("Outline has {} entries", bookmarks.len());
    Ok(bookmarks)
}

async fn page_text(
    runner: &ToolRunner,
    path: &Path,
    page: RenderedPage,
    config: &ConversionConfig,
    total: usize,
) -> PageText {
    let page_num = page.page_num;
    let (words, error) = match text::extract_words(runner, path, &page, config).await {
        Ok(words) => (words, None),
        Err(e) => {
            warn!("{e}");
            if let Some(cb) = &config.progress_callback {
                cb.on_page_error(page_num, total, &e.to_string());
            }
            (Vec::new(), Some(e))
        }
    };

    let layer = overlay::place_words(PageGeometry::new(page.width, page.height), &words);
    debug!(
        page = page_num,
        words = layer.len(),
        skipped = layer.skipped,
        "placed text layer"
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_page_complete(page_num, total, layer.len());
    }

    PageText {
        page,
        words,
        layer,
        error,
    }
}

fn page_result(t: &PageText) -> PageResult {
    PageResult {
        page_num: t.page.page_num,
        width: t.page.width,
        height: t.page.height,
        word_count: t.layer.len(),
        skipped_words: t.layer.skipped,
        error: t.error.clone(),
    }
}

/// The page to name in a `PageOutOfRange` error.
fn first_requested(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.first().copied().unwrap_or(0),
    }
}
