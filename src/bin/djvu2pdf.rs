//! CLI binary for djvu2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use djvu2pdf::{
    convert_to_file, inspect, read_outline, toc, AssemblyBackend, ConversionConfig,
    ConversionProgressCallback, ImageEncoding, PageSelection, ProgressCallback, Stage, TextSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. Pages finish out of order, so the bar only
/// counts completions and every page gets its own log line.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_pages: Mutex<HashSet<usize>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening DjVu…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed_pages: Mutex::new(HashSet::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.reset_eta();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_pages} pages…"))
        ));
    }

    fn on_stage(&self, stage: Stage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message("");
        if stage == Stage::ExtractingText {
            self.bar.set_position(0);
        }
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
        self.bar.inc(1);
    }

    fn on_page_complete(&self, page_num: usize, total: usize, word_count: usize) {
        self.bar.inc(1);
        let failed = self
            .failed_pages
            .lock()
            .map(|f| f.contains(&page_num))
            .unwrap_or(false);
        if failed {
            return;
        }
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{word_count:>5} words")),
        ));
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        if let Ok(mut failed) = self.failed_pages.lock() {
            failed.insert(page_num);
        }

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
    }

    fn on_conversion_complete(&self, total_pages: usize, text_pages: usize) {
        self.bar.finish_and_clear();
        let errors = self.failed_pages.lock().map(|f| f.len()).unwrap_or(0);
        if errors == 0 {
            eprintln!(
                "{} {} pages converted, {} with text",
                green("✔"),
                bold(&total_pages.to_string()),
                text_pages
            );
        } else {
            eprintln!(
                "{} {} pages converted, {} with text  ({} text layers failed)",
                cyan("⚠"),
                bold(&total_pages.to_string()),
                text_pages,
                red(&errors.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes book.pdf next to book.djvu)
  djvu2pdf book.djvu

  # Choose the output file
  djvu2pdf book.djvu -o scans/book.pdf

  # OCR pages that carry no text, in German and English
  djvu2pdf --text-source tesseract --lang deu+eng book.djvu

  # Lossless images, first chapter only
  djvu2pdf --lossless --pages 1-24 book.djvu

  # Let pdfbeads assemble the PDF (JBIG2, smaller files)
  djvu2pdf --backend pdfbeads --text-source djvu2hocr book.djvu

  # Print the outline in pdfbeads TOC format
  djvu2pdf --toc-only book.djvu

  # Page count, first page size and outline as JSON
  djvu2pdf --inspect-only --json book.djvu

TEXT SOURCES:
  auto        stored text layer, OCR for pages without one (default)
  hidden      stored text layer only (djvused)
  djvu2hocr   stored text layer via djvu2hocr (ocrodjvu)
  tesseract   OCR every page
  none        image-only PDF

REQUIRED TOOLS:
  ddjvu, djvused          DjVuLibre
  tesseract               for --text-source auto / tesseract
  djvu2hocr               for --text-source djvu2hocr
  pdfbeads                for --backend pdfbeads

ENVIRONMENT VARIABLES:
  Every flag can be set with DJVU2PDF_<FLAG>, e.g. DJVU2PDF_DPI=200.
  RUST_LOG                Override log filtering (e.g. djvu2pdf=debug)
"#;

/// Convert DjVu documents to searchable PDF.
#[derive(Parser, Debug)]
#[command(
    name = "djvu2pdf",
    version,
    about = "Convert DjVu documents to searchable PDF",
    long_about = "Convert DjVu documents to PDF with an invisible, searchable text layer \
and the document outline carried over as PDF bookmarks.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// DjVu file to convert.
    input: PathBuf,

    /// Output PDF path. Default: the input path with a `.pdf` extension.
    #[arg(short, long, env = "DJVU2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Rendering resolution in DPI (72–600).
    #[arg(long, env = "DJVU2PDF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages rendered and OCR'd in parallel. Default: number of CPUs.
    #[arg(short, long, env = "DJVU2PDF_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Where the text layer comes from.
    #[arg(long, env = "DJVU2PDF_TEXT_SOURCE", value_enum, default_value = "auto")]
    text_source: TextSourceArg,

    /// Tesseract language(s), e.g. eng or deu+eng.
    #[arg(long, env = "DJVU2PDF_LANG", default_value = "eng")]
    lang: String,

    /// How the PDF is assembled.
    #[arg(long, env = "DJVU2PDF_BACKEND", value_enum, default_value = "native")]
    backend: BackendArg,

    /// JPEG quality for page images (1–100).
    #[arg(long, env = "DJVU2PDF_JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Store page images losslessly (Flate) instead of JPEG.
    #[arg(long, env = "DJVU2PDF_LOSSLESS")]
    lossless: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DJVU2PDF_PAGES", default_value = "all")]
    pages: String,

    /// Do not carry the DjVu outline over as bookmarks.
    #[arg(long, env = "DJVU2PDF_NO_OUTLINE")]
    no_outline: bool,

    /// Directory containing ddjvu, djvused, djvu2hocr, tesseract, pdfbeads.
    #[arg(long, env = "DJVU2PDF_BIN_DIR")]
    bin_dir: Option<PathBuf>,

    /// Timeout for each external tool call, in seconds.
    #[arg(long, env = "DJVU2PDF_TOOL_TIMEOUT", default_value_t = 300)]
    tool_timeout: u64,

    /// PDF document title.
    #[arg(long, env = "DJVU2PDF_TITLE")]
    title: Option<String>,

    /// Print the outline in pdfbeads TOC format and exit.
    #[arg(long)]
    toc_only: bool,

    /// Print document information only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print results as JSON.
    #[arg(long, env = "DJVU2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DJVU2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DJVU2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DJVU2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TextSourceArg {
    Auto,
    Hidden,
    Djvu2hocr,
    Tesseract,
    None,
}

impl From<TextSourceArg> for TextSource {
    fn from(v: TextSourceArg) -> Self {
        match v {
            TextSourceArg::Auto => TextSource::Auto,
            TextSourceArg::Hidden => TextSource::HiddenText,
            TextSourceArg::Djvu2hocr => TextSource::Djvu2Hocr,
            TextSourceArg::Tesseract => TextSource::Tesseract,
            TextSourceArg::None => TextSource::None,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Native,
    Pdfbeads,
}

impl From<BackendArg> for AssemblyBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Native => AssemblyBackend::Native,
            BackendArg::Pdfbeads => AssemblyBackend::Pdfbeads,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs unless --verbose is given.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && !cli.toc_only && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── TOC-only mode ────────────────────────────────────────────────────
    if cli.toc_only {
        let config = build_config(&cli, None)?;
        let bookmarks = read_outline(&cli.input, &config)
            .await
            .context("Failed to read outline")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&bookmarks).context("Failed to serialise outline")?
            );
        } else if !bookmarks.is_empty() {
            println!("{}", toc::format_toc(&bookmarks));
        }
        return Ok(());
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let info = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect DjVu")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise document info")?
            );
        } else {
            println!("File:         {}", info.path.display());
            println!("Size:         {} bytes", info.file_size);
            println!("Pages:        {}", info.page_count);
            if let Some((w, h)) = info.first_page_size {
                println!("First page:   {w} × {h} px");
            }
            println!("Bookmarks:    {}", info.bookmarks.len());
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("pdf"));

    // ── Run conversion ───────────────────────────────────────────────────
    let stats = convert_to_file(&cli.input, &output_path, &config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {} words  {} bookmarks  {}ms  →  {}",
            if stats.text_errors == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.converted_pages,
            stats.total_words,
            stats.bookmarks,
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "render {}ms  /  text {}ms  /  assemble {}ms  /  {} bytes",
                stats.render_duration_ms,
                stats.text_duration_ms,
                stats.assemble_duration_ms,
                stats.pdf_bytes
            )),
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages = parse_pages(&cli.pages)?;
    let encoding = if cli.lossless {
        ImageEncoding::Flate
    } else {
        ImageEncoding::Jpeg {
            quality: cli.jpeg_quality,
        }
    };

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .text_source(cli.text_source.into())
        .ocr_language(cli.lang.clone())
        .backend(cli.backend.into())
        .image_encoding(encoding)
        .pages(pages)
        .include_outline(!cli.no_outline)
        .tool_timeout_secs(cli.tool_timeout);

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref dir) = cli.bin_dir {
        builder = builder.bin_dir(dir);
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
