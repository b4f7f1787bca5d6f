//! End-to-end integration tests for djvu2pdf.
//!
//! These tests drive the real DjVuLibre tools (and tesseract / pdfbeads where
//! noted) against a DjVu file supplied by the caller. They are gated behind
//! the `DJVU2PDF_E2E` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   DJVU2PDF_E2E=1 DJVU2PDF_E2E_FILE=/path/to/book.djvu cargo test --test e2e -- --nocapture
//!
//! The pdfbeads test additionally needs `DJVU2PDF_E2E_PDFBEADS=1`.

use djvu2pdf::{
    convert, convert_to_file, inspect, read_outline, AssemblyBackend, ConversionConfig,
    ConversionProgressCallback, ImageEncoding, PageSelection, Stage, TextSource,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless DJVU2PDF_E2E is set and the fixture exists.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("DJVU2PDF_E2E").is_err() {
            println!("SKIP: set DJVU2PDF_E2E=1 to run e2e tests");
            return;
        }
        let Some(p) = std::env::var_os("DJVU2PDF_E2E_FILE").map(PathBuf::from) else {
            println!("SKIP: set DJVU2PDF_E2E_FILE to a DjVu document");
            return;
        };
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn first_page_config(text_source: TextSource) -> ConversionConfig {
    ConversionConfig::builder()
        .dpi(150)
        .pages(PageSelection::Range(1, 2))
        .text_source(text_source)
        .build()
        .unwrap()
}

fn page_count(pdf: &[u8]) -> usize {
    lopdf::Document::load_mem(pdf).unwrap().get_pages().len()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect() {
    let path = e2e_skip_unless_ready!();
    let config = ConversionConfig::default();

    let info = inspect(&path, &config).await.unwrap();
    println!("{info:#?}");
    assert!(info.page_count > 0);
    assert!(info.file_size > 0);

    let outline = read_outline(&path, &config).await.unwrap();
    assert_eq!(outline, info.bookmarks);
}

#[tokio::test]
async fn test_convert_hidden_text() {
    let path = e2e_skip_unless_ready!();
    let output = convert(&path, &first_page_config(TextSource::HiddenText))
        .await
        .unwrap();

    assert!(output.pdf.starts_with(b"%PDF-"));
    assert_eq!(page_count(&output.pdf), output.stats.converted_pages);
    assert_eq!(output.pages.len(), output.stats.converted_pages);
    for page in &output.pages {
        assert!(page.width > 0 && page.height > 0);
    }
    println!("{:#?}", output.stats);
}

#[tokio::test]
async fn test_convert_image_only_lossless() {
    let path = e2e_skip_unless_ready!();
    let config = ConversionConfig::builder()
        .dpi(100)
        .pages(PageSelection::Single(1))
        .text_source(TextSource::None)
        .image_encoding(ImageEncoding::Flate)
        .include_outline(false)
        .build()
        .unwrap();

    let output = convert(&path, &config).await.unwrap();
    assert_eq!(page_count(&output.pdf), 1);
    assert_eq!(output.stats.total_words, 0);
    assert!(output.bookmarks.is_empty());
}

#[derive(Default)]
struct Recorder {
    stages: Mutex<Vec<Stage>>,
    completed: AtomicUsize,
}

impl ConversionProgressCallback for Recorder {
    fn on_stage(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_page_complete(&self, _page: usize, _total: usize, _words: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_convert_to_file_reports_progress() {
    let path = e2e_skip_unless_ready!();
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .dpi(100)
        .pages(PageSelection::Single(1))
        .text_source(TextSource::Auto)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/out.pdf");
    let stats = convert_to_file(&path, &out, &config).await.unwrap();

    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(bytes.len(), stats.pdf_bytes);
    assert_eq!(page_count(&bytes), 1);

    let stages = recorder.stages.lock().unwrap().clone();
    assert_eq!(stages.first(), Some(&Stage::Rasterising));
    assert_eq!(stages.last(), Some(&Stage::Finalising));
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_convert_pdfbeads() {
    let path = e2e_skip_unless_ready!();
    if std::env::var("DJVU2PDF_E2E_PDFBEADS").is_err() {
        println!("SKIP: set DJVU2PDF_E2E_PDFBEADS=1 to run the pdfbeads backend");
        return;
    }
    let config = ConversionConfig::builder()
        .pages(PageSelection::Single(1))
        .text_source(TextSource::Djvu2Hocr)
        .backend(AssemblyBackend::Pdfbeads)
        .build()
        .unwrap();

    let output = convert(&path, &config).await.unwrap();
    assert!(output.pdf.starts_with(b"%PDF"));
}
