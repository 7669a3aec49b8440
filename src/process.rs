//! Chapter orchestration: run the stages in order and manage artifacts.
//!
//! ```text
//! Init ─▶ Downloaded ─▶ Merged ─▶ Composited ─▶ Sliced ─▶ Finalized ─┬─▶ CleanedUp
//!                                                                    └─▶ Retained
//! ```
//!
//! A stage failure halts the chapter with
//! [`PipelineError::StageFailed`], naming the last state reached. Nothing
//! is cleaned up after a failure; intermediate files stay for inspection.

use crate::config::{validate_chapter_number, ChapterConfig, ChapterLayout};
use crate::error::PipelineError;
use crate::output::{
    AssembledPdf, ChapterOutput, ChapterStats, CleanupReport, LongImageInfo, SliceReport,
};
use crate::pipeline::download::{self, DownloadRequest, HttpFetcher, PageFetcher};
use crate::pipeline::slice::SliceParams;
use crate::pipeline::{self, assemble, composite, slice};
use crate::progress::{NoopProgress, PipelineProgress, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Where a chapter is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChapterState {
    Init,
    Downloaded,
    Merged,
    Composited,
    Sliced,
    Finalized,
    CleanedUp,
    /// Finalized with `keep_temp_files`; cleanup skipped.
    Retained,
}

impl fmt::Display for ChapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChapterState::Init => "init",
            ChapterState::Downloaded => "downloaded",
            ChapterState::Merged => "merged",
            ChapterState::Composited => "composited",
            ChapterState::Sliced => "sliced",
            ChapterState::Finalized => "finalized",
            ChapterState::CleanedUp => "cleaned up",
            ChapterState::Retained => "retained",
        };
        f.write_str(name)
    }
}

/// Process one chapter end to end.
///
/// Downloads the pages, builds the merged PDF, the long image, the slices
/// and the final PDF, then cleans up unless `keep_temp_files` is set.
///
/// # Errors
/// Configuration problems are returned as-is. Anything that goes wrong in
/// a stage comes back as [`PipelineError::StageFailed`]; failed page
/// fetches are not errors and only show up in the download report.
pub async fn process_chapter(config: &ChapterConfig) -> Result<ChapterOutput, PipelineError> {
    let total_start = Instant::now();
    let layout = config.layout();
    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgress));

    info!(
        "Processing chapter {} into {}",
        config.chapter_number,
        layout.root.display()
    );
    progress.on_chapter_start(&config.chapter_number);

    // ── Step 1: Download pages ───────────────────────────────────────────
    let request = DownloadRequest::from_config(config, layout.raw_dir.clone())?;
    let fetcher = resolve_fetcher(config)?;

    let download_start = Instant::now();
    let download = download::download_pages(fetcher.as_ref(), &request, progress.as_ref())
        .await
        .map_err(|e| e.halted_at(ChapterState::Init))?;
    let download_duration_ms = download_start.elapsed().as_millis() as u64;
    progress.on_stage_complete(ChapterState::Downloaded, &layout.raw_dir);

    // An empty chapter stops here, before pdfium is needed at all.
    assemble::collect_images(&layout.raw_dir).map_err(|e| e.halted_at(ChapterState::Downloaded))?;

    // ── Steps 2–5: Merge, composite, slice, assemble ─────────────────────
    let render_start = Instant::now();
    let rendered = {
        let layout = layout.clone();
        let params = config.slice_params();
        let library = config.pdfium_lib_path.clone();
        let progress = Arc::clone(&progress);
        tokio::task::spawn_blocking(move || {
            render_stages(library.as_deref(), &layout, &params, progress.as_ref())
        })
        .await
        .map_err(|e| {
            PipelineError::Internal(format!("Render task panicked: {}", e))
                .halted_at(ChapterState::Downloaded)
        })??
    };
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Step 6: Cleanup ──────────────────────────────────────────────────
    let (final_state, cleanup) = if config.keep_temp_files {
        info!("Keeping intermediate files for chapter {}", config.chapter_number);
        progress.on_stage_complete(ChapterState::Retained, &layout.final_pdf);
        (ChapterState::Retained, None)
    } else {
        let report = cleanup_chapter(&layout, config.keep_raw, progress.as_ref())
            .await
            .map_err(|e| e.halted_at(ChapterState::Finalized))?;
        progress.on_stage_complete(ChapterState::CleanedUp, &layout.final_pdf);
        (ChapterState::CleanedUp, Some(report))
    };

    let stats = ChapterStats {
        pages_downloaded: download.downloaded(),
        failed_fetches: download.failed_indices.len(),
        slice_count: rendered.slices.count(),
        download_duration_ms,
        render_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Chapter {} complete: {} pages → {} slices, {}ms total",
        config.chapter_number, stats.pages_downloaded, stats.slice_count, stats.total_duration_ms
    );

    Ok(ChapterOutput {
        chapter_number: config.chapter_number.clone(),
        final_state,
        download,
        merged: rendered.merged,
        long_image: rendered.long_image,
        slices: rendered.slices,
        final_pdf: rendered.final_pdf,
        cleanup,
        stats,
    })
}

/// Synchronous wrapper around [`process_chapter`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_chapter_sync(config: &ChapterConfig) -> Result<ChapterOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_chapter(config))
}

/// Remove a chapter's intermediate artifacts.
///
/// Deletes the merged PDF, the slice folder and, unless `keep_raw`, the
/// raw page folder. The long image and final PDF are never touched, and
/// nothing outside this chapter's paths is. Missing targets are skipped,
/// so running it again after a full or partial cleanup succeeds. A layout
/// whose chapter number is not a plain folder name is refused.
pub async fn cleanup_chapter(
    layout: &ChapterLayout,
    keep_raw: bool,
    progress: &dyn PipelineProgress,
) -> Result<CleanupReport, PipelineError> {
    validate_chapter_number(&layout.chapter_number)?;

    let mut targets: Vec<&Path> = Vec::with_capacity(3);
    if !keep_raw {
        targets.push(&layout.raw_dir);
    }
    targets.push(&layout.merged_pdf);
    targets.push(&layout.slices_dir);

    let mut report = CleanupReport::default();
    for target in targets {
        if remove_if_present(target).await? {
            debug!("Removed {}", target.display());
            progress.on_cleanup_removed(target);
            report.removed.push(target.to_path_buf());
        } else {
            debug!("Nothing to remove at {}", target.display());
        }
    }

    for durable in [&layout.long_image, &layout.final_pdf] {
        if tokio::fs::try_exists(durable).await.unwrap_or(false) {
            report.surviving.push(durable.clone());
        }
    }

    info!(
        "Cleanup of chapter {}: removed {}, kept {}",
        layout.chapter_number,
        report.removed.len(),
        report.surviving.len()
    );
    Ok(report)
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct RenderedStages {
    merged: AssembledPdf,
    long_image: LongImageInfo,
    slices: SliceReport,
    final_pdf: AssembledPdf,
}

/// Everything that needs pdfium, run on one blocking thread.
fn render_stages(
    library: Option<&Path>,
    layout: &ChapterLayout,
    params: &SliceParams,
    progress: &dyn PipelineProgress,
) -> Result<RenderedStages, PipelineError> {
    let pdfium = pipeline::bind_pdfium(library).map_err(|e| e.halted_at(ChapterState::Downloaded))?;

    let merged = assemble::images_to_pdf(&pdfium, &layout.raw_dir, &layout.merged_pdf)
        .map_err(|e| e.halted_at(ChapterState::Downloaded))?;
    progress.on_stage_complete(ChapterState::Merged, &merged.path);

    let long_image = composite::pdf_to_long_image(&pdfium, &merged.path, &layout.long_image)
        .map_err(|e| e.halted_at(ChapterState::Merged))?;
    progress.on_stage_complete(ChapterState::Composited, &long_image.path);

    let slices = slice::slice_long_image(&long_image.path, &layout.slices_dir, params, progress)
        .map_err(|e| e.halted_at(ChapterState::Composited))?;
    progress.on_stage_complete(ChapterState::Sliced, &slices.output_dir);

    let final_pdf = assemble::images_to_pdf(&pdfium, &slices.output_dir, &layout.final_pdf)
        .map_err(|e| e.halted_at(ChapterState::Sliced))?;
    progress.on_stage_complete(ChapterState::Finalized, &final_pdf.path);

    Ok(RenderedStages {
        merged,
        long_image,
        slices,
        final_pdf,
    })
}

/// Use the configured fetcher, or build the HTTP one.
fn resolve_fetcher(config: &ChapterConfig) -> Result<Arc<dyn PageFetcher>, PipelineError> {
    if let Some(ref fetcher) = config.fetcher {
        return Ok(Arc::clone(fetcher));
    }
    Ok(Arc::new(HttpFetcher::new(config.request_timeout_secs)?))
}

/// Delete a file or directory tree. `Ok(false)` if it was not there.
async fn remove_if_present(path: &Path) -> Result<bool, PipelineError> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(PipelineError::io(path, e)),
    };
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}
