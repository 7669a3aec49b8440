//! Progress-callback trait for chapter pipeline events.
//!
//! Stages never print. Anything a user should see (a page downloaded, a
//! fetch that failed, a slice written, a stage finished) is reported to an
//! [`Arc<dyn PipelineProgress>`] injected through
//! [`crate::config::ChapterConfigBuilder::progress_callback`]. The CLI turns
//! these events into terminal output; library callers can forward them
//! anywhere.
//!
//! # Example
//!
//! ```rust
//! use webtoon_pdf::{ChapterConfig, PipelineProgress};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl PipelineProgress for PageCounter {
//!     fn on_page_downloaded(&self, _index: u32, _file_name: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ChapterConfig::builder("https://cdn.example.com/0000-XXX.png", "1", "/tmp/out")
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::FetchError;
use crate::output::DownloadReport;
use crate::process::ChapterState;
use std::path::Path;
use std::sync::Arc;

/// Receives events as a chapter moves through the pipeline.
///
/// All methods default to no-ops. Rendering stages run on a blocking
/// thread, so implementations must be `Send + Sync`.
pub trait PipelineProgress: Send + Sync {
    /// Called once before the first page is requested.
    fn on_chapter_start(&self, chapter_number: &str) {
        let _ = chapter_number;
    }

    /// A page was fetched and written to disk.
    fn on_page_downloaded(&self, index: u32, file_name: &str) {
        let _ = (index, file_name);
    }

    /// A page fetch failed; the downloader moves on to the next index.
    ///
    /// `consecutive` is the length of the current failure run.
    fn on_fetch_failed(&self, index: u32, error: &FetchError, consecutive: u32) {
        let _ = (index, error, consecutive);
    }

    /// The download stage finished, by exhausting the sequence or the range.
    fn on_download_finished(&self, report: &DownloadReport) {
        let _ = report;
    }

    /// A slice image was written.
    fn on_slice_saved(&self, index: usize, height: u32, path: &Path) {
        let _ = (index, height, path);
    }

    /// The chapter reached `state`; `artifact` is what that stage produced.
    fn on_stage_complete(&self, state: ChapterState, artifact: &Path) {
        let _ = (state, artifact);
    }

    /// Cleanup removed an intermediate artifact.
    fn on_cleanup_removed(&self, path: &Path) {
        let _ = path;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// Type stored in [`crate::config::ChapterConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgress>;
