//! Page rasterisation and document queries through DjVuLibre.
//!
//! Each selected page is decoded by `ddjvu` into its own TIFF inside the
//! conversion's work directory. Only the file path and pixel size are kept
//! in memory; the assembler re-reads each image when it embeds it, so peak
//! memory stays at one decoded page per assembly step regardless of
//! document length.

use crate::error::{Djvu2PdfError, ToolError};
use crate::pipeline::tools::ToolRunner;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static SIZE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"width=(\d+)\s+height=(\d+)").expect("valid regex"));

/// A page rendered to disk.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Number of pages in the document (`djvused -e n`).
pub async fn page_count(runner: &ToolRunner, input: &Path) -> Result<usize, Djvu2PdfError> {
    let out = runner
        .run_text("djvused", [OsStr::new("-e"), OsStr::new("n"), input.as_os_str()])
        .await?;
    parse_page_count(&out).ok_or_else(|| {
        Djvu2PdfError::Internal(format!(
            "djvused reported an unreadable page count: {:?}",
            out.trim()
        ))
    })
}

fn parse_page_count(stdout: &str) -> Option<usize> {
    stdout.trim().parse().ok()
}

/// Native size of a page in DjVu pixels (`djvused -e "select N; size"`).
///
/// Returns `None` when the tool fails or prints something unexpected; the
/// caller then skips rescaling.
pub async fn native_size(runner: &ToolRunner, input: &Path, page_num: usize) -> Option<(u32, u32)> {
    let script = format!("select {page_num}; size");
    match runner
        .run_text("djvused", [OsStr::new("-e"), OsStr::new(&script), input.as_os_str()])
        .await
    {
        Ok(out) => parse_size(&out),
        Err(e) => {
            debug!(page = page_num, "could not read native page size: {e}");
            None
        }
    }
}

fn parse_size(stdout: &str) -> Option<(u32, u32)> {
    let caps = SIZE_LINE.captures(stdout)?;
    let w = caps.get(1)?.as_str().parse().ok()?;
    let h = caps.get(2)?.as_str().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

/// File stem for a page, zero-padded to the width of the page count
/// (`page_007` in a 120-page document).
pub fn page_file_stem(page_num: usize, total_pages: usize) -> String {
    let width = total_pages.max(1).to_string().len();
    format!("page_{page_num:0width$}")
}

/// Rasterise one page into `work_dir` at `dpi` and read back its size.
pub async fn render_page(
    runner: &ToolRunner,
    input: &Path,
    work_dir: &Path,
    page_num: usize,
    total_pages: usize,
    dpi: u32,
) -> Result<RenderedPage, Djvu2PdfError> {
    let path = work_dir.join(format!("{}.tiff", page_file_stem(page_num, total_pages)));
    let page_arg = format!("-page={page_num}");
    let scale_arg = format!("-scale={dpi}");

    runner
        .run(
            "ddjvu",
            [
                OsStr::new("-format=tiff"),
                OsStr::new(&page_arg),
                OsStr::new(&scale_arg),
                input.as_os_str(),
                path.as_os_str(),
            ],
        )
        .await
        .map_err(|e| rasterisation_failed(page_num, e))?;

    let tiff_path = path.clone();
    let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&tiff_path))
        .await
        .map_err(|e| Djvu2PdfError::Internal(format!("Render task panicked: {e}")))?
        .map_err(|e| Djvu2PdfError::RasterisationFailed {
            page: page_num,
            detail: format!("ddjvu output is not a readable TIFF: {e}"),
        })?;

    if width == 0 || height == 0 {
        return Err(Djvu2PdfError::RasterisationFailed {
            page: page_num,
            detail: "ddjvu produced an empty image".into(),
        });
    }

    debug!("Rendered page {} → {}x{} px", page_num, width, height);
    Ok(RenderedPage {
        page_num,
        path,
        width,
        height,
    })
}

fn rasterisation_failed(page: usize, e: ToolError) -> Djvu2PdfError {
    match e {
        // A missing ddjvu is a setup problem, not a page problem.
        ToolError::NotFound { .. } => Djvu2PdfError::Tool(e),
        other => {
            warn!(page, "ddjvu failed: {other}");
            Djvu2PdfError::RasterisationFailed {
                page,
                detail: other.to_string(),
            }
        }
    }
}

/// Decode a rendered page. Blocking; call from `spawn_blocking`.
pub fn load_image(page: &RenderedPage) -> Result<DynamicImage, Djvu2PdfError> {
    image::open(&page.path).map_err(|source| Djvu2PdfError::ImageDecode {
        page: page.page_num,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_accepts_trailing_newline() {
        assert_eq!(parse_page_count("42\n"), Some(42));
        assert_eq!(parse_page_count("n/a"), None);
    }

    #[test]
    fn size_line_is_parsed() {
        assert_eq!(parse_size("width=2550 height=3300\n"), Some((2550, 3300)));
        assert_eq!(parse_size("width=0 height=3300"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn page_stems_are_zero_padded_to_page_count_width() {
        assert_eq!(page_file_stem(7, 9), "page_7");
        assert_eq!(page_file_stem(7, 120), "page_007");
        assert_eq!(page_file_stem(120, 120), "page_120");
        assert_eq!(page_file_stem(1, 0), "page_1");
    }

    #[test]
    fn missing_ddjvu_stays_a_tool_error() {
        let e = rasterisation_failed(
            3,
            ToolError::NotFound {
                tool: "ddjvu".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
        );
        assert!(matches!(e, Djvu2PdfError::Tool(_)));

        let e = rasterisation_failed(
            3,
            ToolError::Failed {
                tool: "ddjvu".into(),
                status: "exit status: 1".into(),
                stderr: "bad page".into(),
            },
        );
        assert!(matches!(e, Djvu2PdfError::RasterisationFailed { page: 3, .. }));
    }

    #[test]
    fn load_image_reports_page_on_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_1.tiff");
        std::fs::write(&path, b"not a tiff").unwrap();
        let page = RenderedPage {
            page_num: 1,
            path,
            width: 1,
            height: 1,
        };
        assert!(matches!(
            load_image(&page),
            Err(Djvu2PdfError::ImageDecode { page: 1, .. })
        ));
    }
}
