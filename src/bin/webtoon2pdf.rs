//! CLI binary for webtoon-pdf.
//!
//! A thin shim over the library crate that merges `config.yaml` with CLI
//! flags into a `ChapterConfig`, runs the chapter and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webtoon_pdf::config::{validate_chapter_number, StringOrNumber};
use webtoon_pdf::{
    cleanup_chapter, process_chapter, ChapterLayout, ChapterState, ConfigFile, DownloadReport,
    FetchError, NoopProgress, PipelineError, PipelineProgress, ProgressCallback,
};

const DEFAULT_CONFIG: &str = "config.yaml";

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner anchored at the bottom of the terminal and
/// one log line per page, failed fetch, slice and stage above it.
struct CliProgress {
    bar: ProgressBar,
    pages: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            pages: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgress for CliProgress {
    fn on_chapter_start(&self, chapter_number: &str) {
        self.bar.set_prefix(format!("Chapter {chapter_number}"));
        self.bar.set_message("downloading…");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing chapter {chapter_number}"))
        ));
    }

    fn on_page_downloaded(&self, index: u32, file_name: &str) {
        let n = self.pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.println(format!(
            "  {} Page {:03}  {}",
            green("✓"),
            index,
            dim(file_name)
        ));
        self.bar.set_message(format!("{n} pages downloaded"));
    }

    fn on_fetch_failed(&self, index: u32, error: &FetchError, consecutive: u32) {
        let msg = error.to_string();
        let msg = if msg.chars().count() > 80 {
            format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!(
            "  {} Page {:03}  {}  {}",
            red("✗"),
            index,
            red(&msg),
            dim(&format!("{consecutive} in a row")),
        ));
    }

    fn on_download_finished(&self, report: &DownloadReport) {
        let last = report
            .last_successful_index()
            .map(|i| format!("{i:03}"))
            .unwrap_or_else(|| "none".to_string());
        self.bar.println(format!(
            "  {} {} pages downloaded, last page {}",
            cyan("◆"),
            bold(&report.downloaded().to_string()),
            last
        ));
    }

    fn on_slice_saved(&self, index: usize, height: u32, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| index.to_string());
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            name,
            dim(&format!("{height:>5} px"))
        ));
        self.bar.set_message(format!("slicing… {}", index + 1));
    }

    fn on_stage_complete(&self, state: ChapterState, artifact: &Path) {
        self.bar.println(format!(
            "{} {:<11} {}",
            cyan("◆"),
            bold(&state.to_string()),
            dim(&artifact.display().to_string())
        ));
        let next = match state {
            ChapterState::Downloaded => "merging pages…",
            ChapterState::Merged => "rendering long image…",
            ChapterState::Composited => "slicing…",
            ChapterState::Sliced => "assembling final PDF…",
            ChapterState::Finalized => "cleaning up…",
            _ => "done",
        };
        self.bar.set_message(next);
    }

    fn on_cleanup_removed(&self, path: &Path) {
        self.bar
            .println(format!("  {} {}", dim("−"), dim(&path.display().to_string())));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run with ./config.yaml
  webtoon2pdf

  # Explicit config file, overriding the chapter
  webtoon2pdf --config series.yaml --chapter 12

  # Everything from flags, keeping all intermediate files
  webtoon2pdf --base-url 'https://cdn.example.com/s/0000-XXX.png' \
              --chapter 3 --output ./out --keep-temp-files

  # Only pages 010 to 032
  webtoon2pdf --start 010 --end 032

  # Remove a chapter's intermediate files after a --keep-temp-files run
  webtoon2pdf --cleanup-only --chapter 3 --output ./out

  # Machine-readable report
  webtoon2pdf --json > chapter.json

CONFIG FILE (config.yaml):
  base_url: "https://cdn.example.com/series/0000-XXX.png"
  chapter_number: 0
  output_folder: "/data/webtoons/series"
  start_num: "001"
  keep_temp_files: false

OUTPUT LAYOUT:
  <output>/RawChapters/Chapter<N>/           downloaded pages
  <output>/PDFs/Chapter<N>_Merged.pdf        merged pages
  <output>/LongPNGs/Chapter<N>_Merged.png    long image (kept)
  <output>/FormattedPNGs/Chapter<N>/         slices
  <output>/FinalPDFs/Chapter<N>_Final.pdf    final PDF (kept)

ENVIRONMENT VARIABLES:
  WEBTOON2PDF_*             Every flag, e.g. WEBTOON2PDF_CHAPTER=12
  PDFIUM_LIB_PATH           Path to an existing libpdfium, skips auto-download
  WEBTOON2PDF_PDFIUM_CACHE  Override the default pdfium cache directory
  RUST_LOG                  Log filter, e.g. webtoon_pdf=debug

  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/webtoon2pdf/pdfium-7690/.
"#;

/// Download a webtoon chapter and turn it into a print-paginated PDF.
#[derive(Parser, Debug)]
#[command(
    name = "webtoon2pdf",
    version,
    about = "Download a webtoon chapter and turn it into a print-paginated PDF",
    long_about = "Download a numbered run of page images, stack them into one long strip, \
cut the strip into pages at solid black or white gutters, and assemble the pages into a PDF.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// YAML configuration file. Default: ./config.yaml if it exists.
    #[arg(short, long, env = "WEBTOON2PDF_CONFIG")]
    config: Option<PathBuf>,

    /// Page URL template; XXX is replaced by the 3-digit page number.
    #[arg(long, env = "WEBTOON2PDF_BASE_URL")]
    base_url: Option<String>,

    /// Chapter number, used in folder and file names.
    #[arg(short = 'n', long, env = "WEBTOON2PDF_CHAPTER")]
    chapter: Option<String>,

    /// Root folder for all artifacts.
    #[arg(short, long, env = "WEBTOON2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// First page number.
    #[arg(long, env = "WEBTOON2PDF_START")]
    start: Option<String>,

    /// Last page number (inclusive). Without it the end is auto-detected.
    #[arg(long, env = "WEBTOON2PDF_END")]
    end: Option<String>,

    /// Keep every intermediate file; skip cleanup.
    #[arg(long, env = "WEBTOON2PDF_KEEP_TEMP_FILES")]
    keep_temp_files: bool,

    /// Keep the downloaded pages when cleaning up.
    #[arg(long, env = "WEBTOON2PDF_KEEP_RAW")]
    keep_raw: bool,

    /// Consecutive failed fetches that end a chapter.
    #[arg(long, env = "WEBTOON2PDF_MAX_FAILURES",
          value_parser = clap::value_parser!(u32).range(1..))]
    max_failures: Option<u32>,

    /// Minimum slice height in pixels (842 = A4 at 72 DPI).
    #[arg(long, env = "WEBTOON2PDF_MIN_SLICE_HEIGHT",
          value_parser = clap::value_parser!(u32).range(1..))]
    min_slice_height: Option<u32>,

    /// Height in pixels of the solid band a cut must sit on.
    #[arg(long, env = "WEBTOON2PDF_BAND_HEIGHT",
          value_parser = clap::value_parser!(u32).range(1..))]
    band_height: Option<u32>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "WEBTOON2PDF_TIMEOUT")]
    timeout: Option<u64>,

    /// Path to an existing libpdfium.
    #[arg(long, env = "WEBTOON2PDF_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Only remove the chapter's intermediate files.
    #[arg(long)]
    cleanup_only: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "WEBTOON2PDF_JSON")]
    json: bool,

    /// Disable the progress display.
    #[arg(long, env = "WEBTOON2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "WEBTOON2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "WEBTOON2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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
        .with_writer(std::io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let config_error = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<PipelineError>())
                .filter(|e| e.is_config_error());
            match config_error {
                Some(e) => {
                    eprintln!("{} {}", red("error:"), e.root());
                    ExitCode::from(2)
                }
                None => {
                    eprintln!("{} {:?}", red("error:"), err);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let file = merged_config_file(cli)?;

    // ── Cleanup-only mode ────────────────────────────────────────────────
    if cli.cleanup_only {
        let (layout, keep_raw) = cleanup_target(&file)?;
        let progress = show_progress.then(CliProgress::new);
        let result = match progress {
            Some(ref cb) => cleanup_chapter(&layout, keep_raw, cb.as_ref()).await,
            None => cleanup_chapter(&layout, keep_raw, &NoopProgress).await,
        };
        if let Some(ref cb) = progress {
            cb.finish();
        }
        let report = result.context("Cleanup failed")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !cli.quiet {
            eprintln!(
                "{} Chapter {}: removed {}, kept {}",
                green("✔"),
                layout.chapter_number,
                report.removed.len(),
                report.surviving.len()
            );
        }
        return Ok(());
    }

    let mut builder = file.into_builder()?;

    // ── Ensure PDFium engine is available ────────────────────────────────
    // First run downloads the library (~30 MB) into the cache; later runs
    // find it there with a path check.
    if cli.pdfium_lib.is_none() {
        let path = ensure_pdfium(cli.quiet)?;
        builder = builder.pdfium_lib_path(path);
    }

    let progress = show_progress.then(CliProgress::new);
    if let Some(ref cb) = progress {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let config = builder.build()?;

    // ── Run the chapter ──────────────────────────────────────────────────
    let result = process_chapter(&config).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }
    let output = result.with_context(|| format!("Chapter {} failed", config.chapter_number))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  Chapter {}: {} pages → {} slices  {}ms  →  {}",
            green("✔"),
            output.chapter_number,
            stats.pages_downloaded,
            stats.slice_count,
            stats.total_duration_ms,
            bold(&output.final_pdf.path.display().to_string()),
        );
        eprintln!(
            "   {} {}",
            dim("long image"),
            dim(&output.long_image.path.display().to_string())
        );
        if stats.failed_fetches > 0 {
            eprintln!(
                "   {} failed fetches {}",
                yellow("⚠"),
                dim(&format!("{:?}", output.download.failed_indices))
            );
        }
    }

    Ok(())
}

/// `--config`, else ./config.yaml if present, with CLI flags layered on top.
fn merged_config_file(cli: &Cli) -> Result<ConfigFile> {
    let mut file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => ConfigFile::load(DEFAULT_CONFIG)?,
        None => ConfigFile::default(),
    };

    if let Some(ref url) = cli.base_url {
        file.base_url = Some(url.clone());
    }
    if let Some(ref chapter) = cli.chapter {
        file.chapter_number = Some(StringOrNumber::Text(chapter.clone()));
    }
    if let Some(ref output) = cli.output {
        file.output_folder = Some(output.clone());
    }
    if let Some(ref start) = cli.start {
        file.start_num = Some(StringOrNumber::Text(start.clone()));
    }
    if let Some(ref end) = cli.end {
        file.end_num = Some(StringOrNumber::Text(end.clone()));
    }
    file.keep_temp_files |= cli.keep_temp_files;
    file.keep_raw |= cli.keep_raw;
    if cli.max_failures.is_some() {
        file.max_consecutive_failures = cli.max_failures;
    }
    if cli.min_slice_height.is_some() {
        file.min_slice_height = cli.min_slice_height;
    }
    if cli.band_height.is_some() {
        file.band_height = cli.band_height;
    }
    if cli.timeout.is_some() {
        file.request_timeout_secs = cli.timeout;
    }
    if cli.pdfium_lib.is_some() {
        file.pdfium_lib_path = cli.pdfium_lib.clone();
    }
    Ok(file)
}

/// Cleanup needs only the chapter and the output root, not a base URL.
fn cleanup_target(file: &ConfigFile) -> Result<(ChapterLayout, bool)> {
    let chapter = file
        .chapter_number
        .clone()
        .map(StringOrNumber::into_string)
        .filter(|c| !c.trim().is_empty())
        .ok_or(PipelineError::MissingField {
            field: "chapter_number",
        })?;
    validate_chapter_number(&chapter)?;
    let root = file
        .output_folder
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(PipelineError::MissingField {
            field: "output_folder",
        })?;
    Ok((ChapterLayout::new(root, &chapter), file.keep_raw))
}

/// Resolve libpdfium, downloading it with a byte progress bar if needed.
fn ensure_pdfium(quiet: bool) -> Result<PathBuf> {
    if let Some(source) = pdfium_fetch::locate() {
        return Ok(source.path().to_path_buf());
    }
    if quiet {
        return tokio::task::block_in_place(|| pdfium_fetch::ensure_library(None))
            .context("Failed to download PDFium engine");
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    let path = tokio::task::block_in_place(|| {
        pdfium_fetch::ensure_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(path)
}
