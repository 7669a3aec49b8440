//! Reports produced by each stage and by a whole chapter run.
//!
//! All types are `Serialize` so the CLI can emit them with `--json`.

use crate::process::ChapterState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the download stage stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadTermination {
    /// Auto-detect mode hit the consecutive-failure threshold.
    ///
    /// This is also what a mid-chapter outage of the same length looks
    /// like; the two cannot be told apart.
    SequenceExhausted {
        /// `None` when no page was fetched at all.
        last_successful_index: Option<u32>,
        consecutive_failures: u32,
    },
    /// Bounded mode reached its end index.
    RangeCompleted { end_index: u32 },
}

/// Result of the download stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadReport {
    pub output_dir: PathBuf,
    pub start_index: u32,
    /// File names written, in fetch order.
    pub files: Vec<String>,
    /// Indices whose fetch failed, including the trailing run that ended
    /// an auto-detected chapter.
    pub failed_indices: Vec<u32>,
    pub termination: DownloadTermination,
}

impl DownloadReport {
    /// Highest index fetched successfully.
    pub fn last_successful_index(&self) -> Option<u32> {
        match self.termination {
            DownloadTermination::SequenceExhausted {
                last_successful_index,
                ..
            } => last_successful_index,
            DownloadTermination::RangeCompleted { end_index } => {
                // Failed indices in a range are skipped, not fatal.
                (self.start_index..=end_index)
                    .rev()
                    .find(|i| !self.failed_indices.contains(i))
            }
        }
    }

    pub fn downloaded(&self) -> usize {
        self.files.len()
    }
}

/// A PDF built from a directory of images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledPdf {
    pub path: PathBuf,
    pub page_count: usize,
}

/// The stacked long image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongImageInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Pixel height of each rendered PDF page, top to bottom.
    pub page_heights: Vec<u32>,
}

/// Result of slicing a long image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceReport {
    pub output_dir: PathBuf,
    /// Rows each slice takes from the long image, in order. Sums to the
    /// long image height.
    pub content_heights: Vec<u32>,
    /// Height of each written slice image; differs from the content height
    /// only for a short tail slice padded up to the minimum.
    pub page_heights: Vec<u32>,
}

impl SliceReport {
    pub fn count(&self) -> usize {
        self.content_heights.len()
    }
}

/// What cleanup removed and what it left in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Durable outputs (long image, final PDF) that exist after cleanup.
    pub surviving: Vec<PathBuf>,
}

/// Timing and volume counters for one chapter run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterStats {
    pub pages_downloaded: usize,
    pub failed_fetches: usize,
    pub slice_count: usize,
    pub download_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a finished chapter run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterOutput {
    pub chapter_number: String,
    /// `CleanedUp` or `Retained`.
    pub final_state: ChapterState,
    pub download: DownloadReport,
    pub merged: AssembledPdf,
    pub long_image: LongImageInfo,
    pub slices: SliceReport,
    pub final_pdf: AssembledPdf,
    pub cleanup: Option<CleanupReport>,
    pub stats: ChapterStats,
}
