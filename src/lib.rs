//! # webtoon-pdf
//!
//! Turn a sequentially numbered run of webtoon page images into a
//! print-paginated PDF.
//!
//! Webtoons are drawn as one endless vertical strip and published as a
//! series of page images whose boundaries fall wherever the uploader cut
//! them. This crate downloads those images, stacks them back into one long
//! strip, and re-cuts it into pages of at least A4 height, placing every
//! cut on a solid black or white gutter so no panel is split in two.
//!
//! ## Pipeline Overview
//!
//! ```text
//! base URL (…/0000-XXX.png)
//!  │
//!  ├─ 1. Download   fetch 001, 002, … until 5 fetches in a row fail
//!  ├─ 2. Merge      one PDF page per downloaded image (pdfium)
//!  ├─ 3. Composite  render every page, stack into one long PNG
//!  ├─ 4. Slice      cut at solid black/white bands, ≥ 842 px per slice
//!  ├─ 5. Assemble   one PDF page per slice
//!  └─ 6. Cleanup    drop raw pages, merged PDF, slices
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webtoon_pdf::{process_chapter, ChapterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChapterConfig::builder(
//!         "https://cdn.example.com/series/0000-XXX.png",
//!         "12",
//!         "/data/webtoons/series",
//!     )
//!     .build()?;
//!     let output = process_chapter(&config).await?;
//!     println!("{}", output.final_pdf.path.display());
//!     eprintln!("{} pages → {} slices",
//!         output.stats.pages_downloaded,
//!         output.stats.slice_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `webtoon2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! webtoon-pdf = { version = "0.3", default-features = false }
//! ```
//!
//! ## PDFium
//!
//! The merge, composite and assemble stages use PDFium through
//! `pdfium-render`. The library is located (or downloaded once and cached)
//! by the `pdfium-fetch` workspace crate; set `PDFIUM_LIB_PATH` or
//! [`ChapterConfig::pdfium_lib_path`] to use an existing copy.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ChapterConfig, ChapterConfigBuilder, ChapterLayout, ConfigFile};
pub use error::{FetchError, PipelineError};
pub use output::{
    AssembledPdf, ChapterOutput, ChapterStats, CleanupReport, DownloadReport,
    DownloadTermination, LongImageInfo, SliceReport,
};
pub use pipeline::download::{HttpFetcher, PageFetcher};
pub use pipeline::slice::SliceParams;
pub use process::{cleanup_chapter, process_chapter, process_chapter_sync, ChapterState};
pub use progress::{NoopProgress, PipelineProgress, ProgressCallback};
