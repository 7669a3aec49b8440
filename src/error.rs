//! Error types for the webtoon-pdf library.
//!
//! Two error types mirror the two ways a chapter run can go wrong:
//!
//! * [`PipelineError`]: **fatal** for the current stage (bad configuration,
//!   a directory with no images, a PDF with no pages, an unwritable output).
//!   Returned as `Err(PipelineError)` and halts the chapter without cleanup.
//!
//! * [`FetchError`]: **non-fatal**; one page could not be fetched. The
//!   downloader counts it, reports it through
//!   [`crate::progress::PipelineProgress::on_fetch_failed`] and moves on to
//!   the next index. A run of them is how the end of a chapter is detected.

use crate::process::ChapterState;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the webtoon-pdf library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// A required setting was not supplied.
    #[error("Missing required configuration: {field}")]
    MissingField { field: &'static str },

    /// A setting was supplied but is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("Cannot read configuration file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this tool.
    #[error("Cannot parse configuration file '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    // ── Structural errors ─────────────────────────────────────────────────
    /// A stage expected images in a directory and found none.
    #[error("No PNG images found in '{dir}'")]
    NoImagesFound { dir: PathBuf },

    /// A PDF opened fine but has no pages to render.
    #[error("PDF '{path}' has no pages")]
    EmptyPdf { path: PathBuf },

    /// pdfium could not open the PDF.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium failed while rendering one page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// An image file could not be decoded.
    #[error("Cannot decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// An image could not be encoded or written.
    #[error("Cannot write image '{path}': {detail}")]
    ImageWrite { path: PathBuf, detail: String },

    /// Building or saving a PDF document failed.
    #[error("Cannot write PDF '{path}': {detail}")]
    PdfWrite { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem operation on a stage artifact failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// No PDFium library could be located or bound.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Orchestration ─────────────────────────────────────────────────────
    /// A stage failed; the chapter halted after reaching `reached`.
    ///
    /// Artifacts written up to that point are left on disk.
    #[error("Chapter halted after reaching '{reached}': {source}")]
    StageFailed {
        reached: ChapterState,
        #[source]
        source: Box<PipelineError>,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap this error as a stage failure recorded at `reached`.
    pub(crate) fn halted_at(self, reached: ChapterState) -> Self {
        PipelineError::StageFailed {
            reached,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`PipelineError::StageFailed`].
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// `true` for errors raised before any stage runs.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::MissingField { .. }
                | PipelineError::InvalidConfig(_)
                | PipelineError::ConfigRead { .. }
                | PipelineError::ConfigParse { .. }
        )
    }

    /// `true` when a stage found its input unusable (no images, no pages).
    pub fn is_structural(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::NoImagesFound { .. }
                | PipelineError::EmptyPdf { .. }
                | PipelineError::CorruptPdf { .. }
                | PipelineError::ImageDecode { .. }
        )
    }
}

/// A non-fatal error for a single page fetch.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The request never produced a response.
    #[error("request to {url} failed: {detail}")]
    Network { url: String, detail: String },

    /// The request exceeded the configured timeout.
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
}
