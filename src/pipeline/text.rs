//! Per-page text extraction.
//!
//! Dispatches on [`TextSource`] and always returns word boxes in the pixel
//! space of the rendered page image (top-left origin), ready for
//! [`crate::overlay::place_words`]. Sources that report native DjVu
//! coordinates are rescaled using the page size from `djvused size`.
//!
//! Failures never abort the conversion: they come back as a
//! [`PageError::TextLayer`] and the page is emitted image-only.

use crate::config::{ConversionConfig, TextSource};
use crate::error::{PageError, ToolError};
use crate::hocr;
use crate::overlay::WordBox;
use crate::pipeline::render::{self, RenderedPage};
use crate::pipeline::tools::ToolRunner;
use crate::sexpr::{self, BoxOrigin};
use std::ffi::OsStr;
use std::path::Path;
use tracing::debug;

/// Extract the word boxes of one rendered page.
pub async fn extract_words(
    runner: &ToolRunner,
    input: &Path,
    page: &RenderedPage,
    config: &ConversionConfig,
) -> Result<Vec<WordBox>, PageError> {
    match config.text_source {
        TextSource::None => Ok(Vec::new()),
        TextSource::HiddenText => hidden_text(runner, input, page).await,
        TextSource::Djvu2Hocr => djvu2hocr(runner, input, page).await,
        TextSource::Tesseract => tesseract(runner, page, config).await,
        TextSource::Auto => match hidden_text(runner, input, page).await {
            Ok(words) if !words.is_empty() => Ok(words),
            Ok(_) => {
                debug!(page = page.page_num, "no hidden text, running OCR");
                tesseract(runner, page, config).await
            }
            Err(e) => {
                debug!(page = page.page_num, "hidden text unavailable ({e}), running OCR");
                tesseract(runner, page, config).await
            }
        },
    }
}

async fn hidden_text(
    runner: &ToolRunner,
    input: &Path,
    page: &RenderedPage,
) -> Result<Vec<WordBox>, PageError> {
    let script = format!("select {}; print-txt", page.page_num);
    let out = runner
        .run_text(
            "djvused",
            [OsStr::new("-u"), OsStr::new("-e"), OsStr::new(&script), input.as_os_str()],
        )
        .await
        .map_err(|e| tool_error(page.page_num, e))?;

    let native = render::native_size(runner, input, page.page_num).await;
    words_from_hidden_text(&out, native, page)
}

/// Parse `print-txt` output and map it onto the rendered page.
fn words_from_hidden_text(
    stdout: &str,
    native: Option<(u32, u32)>,
    page: &RenderedPage,
) -> Result<Vec<WordBox>, PageError> {
    let exprs = sexpr::parse(stdout).map_err(|e| PageError::TextLayer {
        page: page.page_num,
        source_name: "djvused".into(),
        detail: format!("unreadable hidden text: {e}"),
    })?;
    let (_, native_h) = native.unwrap_or((page.width, page.height));
    let words = sexpr::word_boxes(&exprs, BoxOrigin::BottomLeft, native_h as f32);
    Ok(rescale(words, native, page))
}

async fn djvu2hocr(
    runner: &ToolRunner,
    input: &Path,
    page: &RenderedPage,
) -> Result<Vec<WordBox>, PageError> {
    let page_arg = page.page_num.to_string();
    let out = runner
        .run_text(
            "djvu2hocr",
            [input.as_os_str(), OsStr::new("-p"), OsStr::new(&page_arg)],
        )
        .await
        .map_err(|e| tool_error(page.page_num, e))?;

    let native = render::native_size(runner, input, page.page_num).await;
    Ok(rescale(hocr::parse_words(&out), native, page))
}

async fn tesseract(
    runner: &ToolRunner,
    page: &RenderedPage,
    config: &ConversionConfig,
) -> Result<Vec<WordBox>, PageError> {
    let dpi = config.dpi.to_string();
    let out = runner
        .run_text(
            "tesseract",
            [
                page.path.as_os_str(),
                OsStr::new("stdout"),
                OsStr::new("-l"),
                OsStr::new(&config.ocr_language),
                OsStr::new("--dpi"),
                OsStr::new(&dpi),
                OsStr::new("hocr"),
            ],
        )
        .await
        .map_err(|e| tool_error(page.page_num, e))?;
    Ok(hocr::parse_words(&out))
}

/// Map native-coordinate boxes onto the rendered image.
///
/// Boxes that fit the native page are clamped to the rendered page after
/// scaling, so float rounding never pushes an edge-touching box off the page.
/// Boxes already outside the native page are left for placement to reject.
fn rescale(words: Vec<WordBox>, native: Option<(u32, u32)>, page: &RenderedPage) -> Vec<WordBox> {
    let Some((nw, nh)) = native else {
        return words;
    };
    if (nw, nh) == (page.width, page.height) {
        return words;
    }
    let (nw, nh) = (nw as f32, nh as f32);
    let (pw, ph) = (page.width as f32, page.height as f32);
    let (sx, sy) = (pw / nw, ph / nh);
    words
        .iter()
        .map(|w| {
            let scaled = w.scaled(sx, sy);
            if w.x1 <= nw && w.y1 <= nh {
                scaled.clamped(pw, ph)
            } else {
                scaled
            }
        })
        .collect()
}

fn tool_error(page: usize, e: ToolError) -> PageError {
    PageError::TextLayer {
        page,
        source_name: e.tool().to_string(),
        detail: e.to_string(),
    }
}
