//! Assembly through the external `pdfbeads` tool.
//!
//! pdfbeads takes `image, hOCR` pairs plus a TOC file and produces a
//! searchable PDF with JBIG2 page images, which is considerably smaller than
//! the native backend for bitonal scans. The work directory ends up as:
//!
//! ```text
//! page_01.tiff  page_01.html
//! page_02.tiff  page_02.html
//! toc.out.txt
//! output.pdf
//! ```
//!
//! All paths are passed relative to the work directory, which is also the
//! tool's working directory.

use crate::error::{Djvu2PdfError, ToolError};
use crate::hocr;
use crate::overlay::{PageGeometry, WordBox};
use crate::pipeline::assemble::OutlineEntry;
use crate::pipeline::render::RenderedPage;
use crate::pipeline::tools::ToolRunner;
use crate::toc::{self, Bookmark};
use std::ffi::OsString;
use std::path::Path;
use tracing::info;

pub const TOC_FILE: &str = "toc.out.txt";
pub const OUTPUT_FILE: &str = "output.pdf";

/// Write hOCR files and the TOC next to the rendered pages and return the
/// pdfbeads argument list.
pub async fn prepare_inputs(
    work_dir: &Path,
    pages: &[(RenderedPage, Vec<WordBox>)],
    outline: &[OutlineEntry],
) -> Result<Vec<OsString>, Djvu2PdfError> {
    let mut args: Vec<OsString> = vec![
        "--toc".into(),
        TOC_FILE.into(),
        "-o".into(),
        OUTPUT_FILE.into(),
    ];

    for (page, words) in pages {
        let (Some(image_name), Some(stem)) = (page.path.file_name(), page.path.file_stem()) else {
            return Err(Djvu2PdfError::Internal(format!(
                "rendered page has no file name: {}",
                page.path.display()
            )));
        };
        let html_name = format!("{}.html", stem.to_string_lossy());
        let geometry = PageGeometry::new(page.width, page.height);
        let valid: Vec<WordBox> = words.iter().filter(|w| w.is_valid(&geometry)).cloned().collect();
        let html = hocr::write_page(page.page_num, geometry, &valid);
        write(work_dir, &html_name, html.as_bytes()).await?;

        args.push(image_name.to_os_string());
        args.push(html_name.into());
    }

    write(work_dir, TOC_FILE, toc_file(outline).as_bytes()).await?;
    Ok(args)
}

/// TOC lines with references renumbered to output pages.
fn toc_file(outline: &[OutlineEntry]) -> String {
    let renumbered: Vec<Bookmark> = outline
        .iter()
        .map(|e| Bookmark {
            title: e.title.clone(),
            reference: format!("#{}", e.page_index + 1),
            depth: e.depth,
        })
        .collect();
    toc::format_toc(&renumbered)
}

async fn write(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), Djvu2PdfError> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| Djvu2PdfError::OutputWriteFailed { path, source })
}

/// Run pdfbeads over the prepared work directory and return the PDF bytes.
pub async fn assemble_pdfbeads(
    runner: &ToolRunner,
    work_dir: &Path,
    pages: &[(RenderedPage, Vec<WordBox>)],
    outline: &[OutlineEntry],
) -> Result<Vec<u8>, Djvu2PdfError> {
    if pages.is_empty() {
        return Err(Djvu2PdfError::AssemblyFailed("no pages to write".into()));
    }
    let args = prepare_inputs(work_dir, pages, outline).await?;

    runner
        .run_in("pdfbeads", &args, Some(work_dir))
        .await
        .map_err(|e| match e {
            ToolError::NotFound { .. } => Djvu2PdfError::Tool(e),
            other => Djvu2PdfError::AssemblyFailed(other.to_string()),
        })?;

    let out = work_dir.join(OUTPUT_FILE);
    let pdf = tokio::fs::read(&out).await.map_err(|e| {
        Djvu2PdfError::AssemblyFailed(format!("pdfbeads produced no output: {e}"))
    })?;
    info!("pdfbeads assembled {} pages → {} bytes", pages.len(), pdf.len());
    Ok(pdf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(dir: &Path, n: usize) -> RenderedPage {
        RenderedPage {
            page_num: n,
            path: dir.join(format!("page_{n:02}.tiff")),
            width: 100,
            height: 200,
        }
    }

    #[tokio::test]
    async fn writes_pairs_and_renumbered_toc() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![
            (page(dir.path(), 3), vec![WordBox::new("kept", 1.0, 2.0, 30.0, 12.0)]),
            (
                page(dir.path(), 10),
                vec![WordBox::new("outside", 0.0, 0.0, 500.0, 10.0)],
            ),
        ];
        let outline = vec![
            OutlineEntry {
                title: "Part".into(),
                depth: 0,
                page_index: 0,
            },
            OutlineEntry {
                title: "Chapter".into(),
                depth: 1,
                page_index: 1,
            },
        ];

        let args = prepare_inputs(dir.path(), &pages, &outline).await.unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--toc",
                TOC_FILE,
                "-o",
                OUTPUT_FILE,
                "page_03.tiff",
                "page_03.html",
                "page_10.tiff",
                "page_10.html"
            ]
        );

        let toc = std::fs::read_to_string(dir.path().join(TOC_FILE)).unwrap();
        assert_eq!(toc, "\"Part\" \"1\"\n\t\"Chapter\" \"2\"");

        let first = std::fs::read_to_string(dir.path().join("page_03.html")).unwrap();
        assert!(first.contains(">kept</span>"));
        let second = std::fs::read_to_string(dir.path().join("page_10.html")).unwrap();
        assert!(!second.contains("outside"));
    }

    #[tokio::test]
    async fn no_pages_is_an_assembly_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ToolRunner::new(None, std::time::Duration::from_secs(1));
        let err = assemble_pdfbeads(&runner, dir.path(), &[], &[]).await.unwrap_err();
        assert!(matches!(err, Djvu2PdfError::AssemblyFailed(_)));
    }
}
