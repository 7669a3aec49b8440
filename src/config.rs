//! Configuration types for a chapter run.
//!
//! Every knob lives in [`ChapterConfig`], built through
//! [`ChapterConfigBuilder`] or loaded from a YAML [`ConfigFile`]. The folder
//! layout a run reads and writes is derived once into an immutable
//! [`ChapterLayout`] and handed to each stage explicitly.

use crate::error::PipelineError;
use crate::pipeline::download::PageFetcher;
use crate::pipeline::slice::{SliceParams, A4_HEIGHT_PX, DEFAULT_BAND_HEIGHT};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Token in the base URL replaced by the zero-padded page index.
pub const PAGE_PLACEHOLDER: &str = "XXX";

/// Default first page index.
pub const DEFAULT_START_NUM: &str = "001";

/// Consecutive failed fetches that end an auto-detected chapter.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Configuration for processing one chapter.
///
/// # Example
/// ```rust
/// use webtoon_pdf::ChapterConfig;
///
/// let config = ChapterConfig::builder(
///     "https://cdn.example.com/series/0000-XXX.png",
///     "12",
///     "/tmp/webtoons",
/// )
/// .start_num("001")
/// .keep_temp_files(true)
/// .build()
/// .unwrap();
/// assert_eq!(config.max_consecutive_failures, 5);
/// ```
#[derive(Clone)]
pub struct ChapterConfig {
    /// URL template containing [`PAGE_PLACEHOLDER`].
    pub base_url: String,

    /// Chapter identifier; only used to name folders and files.
    pub chapter_number: String,

    /// Root under which the five artifact folders live.
    pub output_folder: PathBuf,

    /// First page index, decimal. Default: "001".
    pub start_num: String,

    /// Last page index (inclusive). `None` auto-detects the end of the
    /// chapter from a run of failed fetches.
    pub end_num: Option<String>,

    /// Skip cleanup entirely and keep every intermediate artifact. Default: false.
    pub keep_temp_files: bool,

    /// When cleanup runs, keep the downloaded pages. Default: false.
    pub keep_raw: bool,

    /// Consecutive failed fetches that end auto-detection. Default: 5.
    ///
    /// A genuine outage of this many requests in the middle of a chapter is
    /// indistinguishable from the last page.
    pub max_consecutive_failures: u32,

    /// Minimum slice height in pixels. Default: 842 (A4 at 72 DPI).
    pub min_slice_height: u32,

    /// Thickness of the probe used to find a gutter band. Default: 5.
    pub band_height: u32,

    /// Per-request timeout. `None` keeps the HTTP client default.
    pub request_timeout_secs: Option<u64>,

    /// Explicit PDFium library. `None` resolves through `pdfium-fetch`.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Pre-built page fetcher. `None` uses [`crate::pipeline::download::HttpFetcher`].
    pub fetcher: Option<Arc<dyn PageFetcher>>,

    /// Receives per-page, per-slice and per-stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for ChapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChapterConfig")
            .field("base_url", &self.base_url)
            .field("chapter_number", &self.chapter_number)
            .field("output_folder", &self.output_folder)
            .field("start_num", &self.start_num)
            .field("end_num", &self.end_num)
            .field("keep_temp_files", &self.keep_temp_files)
            .field("keep_raw", &self.keep_raw)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .field("min_slice_height", &self.min_slice_height)
            .field("band_height", &self.band_height)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn PageFetcher>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgress>"),
            )
            .finish()
    }
}

impl ChapterConfig {
    /// Start a builder with the three required settings.
    pub fn builder(
        base_url: impl Into<String>,
        chapter_number: impl Into<String>,
        output_folder: impl Into<PathBuf>,
    ) -> ChapterConfigBuilder {
        ChapterConfigBuilder {
            config: ChapterConfig {
                base_url: base_url.into(),
                chapter_number: chapter_number.into(),
                output_folder: output_folder.into(),
                start_num: DEFAULT_START_NUM.to_string(),
                end_num: None,
                keep_temp_files: false,
                keep_raw: false,
                max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
                min_slice_height: A4_HEIGHT_PX,
                band_height: DEFAULT_BAND_HEIGHT,
                request_timeout_secs: None,
                pdfium_lib_path: None,
                fetcher: None,
                progress_callback: None,
            },
        }
    }

    /// Folder layout for this chapter.
    pub fn layout(&self) -> ChapterLayout {
        ChapterLayout::new(&self.output_folder, &self.chapter_number)
    }

    /// Slicer parameters for this chapter.
    pub fn slice_params(&self) -> SliceParams {
        SliceParams {
            min_height: self.min_slice_height,
            band_height: self.band_height,
        }
    }

    /// Parsed first page index.
    pub fn start_index(&self) -> Result<u32, PipelineError> {
        parse_index("start_num", &self.start_num)
    }

    /// Parsed last page index, if bounded.
    pub fn end_index(&self) -> Result<Option<u32>, PipelineError> {
        self.end_num
            .as_deref()
            .map(|s| parse_index("end_num", s))
            .transpose()
    }
}

/// Check that `chapter_number` names exactly one folder level.
///
/// The value is spliced into `Chapter<N>` folder and file names, and
/// cleanup deletes those paths recursively, so separators and `..` are
/// rejected.
pub fn validate_chapter_number(chapter_number: &str) -> Result<(), PipelineError> {
    let folder = format!("Chapter{chapter_number}");
    let mut components = Path::new(&folder).components();
    let single_level = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    let forbidden = chapter_number.contains(['/', '\\', '\0']) || chapter_number.contains("..");
    if !single_level || forbidden {
        return Err(PipelineError::InvalidConfig(format!(
            "chapter_number must be a plain name without path separators or '..', got '{chapter_number}'"
        )));
    }
    Ok(())
}

fn parse_index(field: &str, value: &str) -> Result<u32, PipelineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PipelineError::InvalidConfig(format!(
            "{field} must be a decimal page number, got '{value}'"
        )));
    }
    trimmed.parse().map_err(|_| {
        PipelineError::InvalidConfig(format!("{field} is out of range: '{value}'"))
    })
}

/// Builder for [`ChapterConfig`].
#[derive(Debug)]
pub struct ChapterConfigBuilder {
    config: ChapterConfig,
}

impl ChapterConfigBuilder {
    pub fn start_num(mut self, start: impl Into<String>) -> Self {
        self.config.start_num = start.into();
        self
    }

    pub fn end_num(mut self, end: impl Into<String>) -> Self {
        self.config.end_num = Some(end.into());
        self
    }

    pub fn keep_temp_files(mut self, v: bool) -> Self {
        self.config.keep_temp_files = v;
        self
    }

    pub fn keep_raw(mut self, v: bool) -> Self {
        self.config.keep_raw = v;
        self
    }

    pub fn max_consecutive_failures(mut self, n: u32) -> Self {
        self.config.max_consecutive_failures = n;
        self
    }

    pub fn min_slice_height(mut self, px: u32) -> Self {
        self.config.min_slice_height = px;
        self
    }

    pub fn band_height(mut self, px: u32) -> Self {
        self.config.band_height = px;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ChapterConfig, PipelineError> {
        let c = &self.config;
        if c.base_url.trim().is_empty() {
            return Err(PipelineError::MissingField { field: "base_url" });
        }
        if c.chapter_number.trim().is_empty() {
            return Err(PipelineError::MissingField {
                field: "chapter_number",
            });
        }
        validate_chapter_number(&c.chapter_number)?;
        if c.output_folder.as_os_str().is_empty() {
            return Err(PipelineError::MissingField {
                field: "output_folder",
            });
        }
        if !c.base_url.contains(PAGE_PLACEHOLDER) {
            return Err(PipelineError::InvalidConfig(format!(
                "base_url must contain the page placeholder '{PAGE_PLACEHOLDER}': {}",
                c.base_url
            )));
        }

        let start = c.start_index()?;
        if let Some(end) = c.end_index()? {
            if end < start {
                return Err(PipelineError::InvalidConfig(format!(
                    "end_num ({end}) is before start_num ({start})"
                )));
            }
        }
        if c.max_consecutive_failures == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_consecutive_failures must be ≥ 1".into(),
            ));
        }
        if c.min_slice_height == 0 {
            return Err(PipelineError::InvalidConfig(
                "min_slice_height must be ≥ 1".into(),
            ));
        }
        if c.band_height == 0 {
            return Err(PipelineError::InvalidConfig(
                "band_height must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Folder layout ────────────────────────────────────────────────────────

/// Per-chapter artifact paths under an output root.
///
/// ```text
/// <root>/RawChapters/Chapter<N>/              downloaded pages
/// <root>/PDFs/Chapter<N>_Merged.pdf           pages merged into one PDF
/// <root>/LongPNGs/Chapter<N>_Merged.png       long image (kept)
/// <root>/FormattedPNGs/Chapter<N>/slice_NNN.png
/// <root>/FinalPDFs/Chapter<N>_Final.pdf       final PDF (kept)
/// ```
///
/// Every path is scoped to one chapter, so runs for different chapters
/// never touch each other's files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterLayout {
    pub chapter_number: String,
    pub root: PathBuf,
    pub raw_dir: PathBuf,
    pub merged_pdf: PathBuf,
    pub long_image: PathBuf,
    pub slices_dir: PathBuf,
    pub final_pdf: PathBuf,
}

impl ChapterLayout {
    pub fn new(root: impl AsRef<Path>, chapter_number: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        let chapter = format!("Chapter{chapter_number}");
        Self {
            chapter_number: chapter_number.to_string(),
            raw_dir: root.join("RawChapters").join(&chapter),
            merged_pdf: root.join("PDFs").join(format!("{chapter}_Merged.pdf")),
            long_image: root.join("LongPNGs").join(format!("{chapter}_Merged.png")),
            slices_dir: root.join("FormattedPNGs").join(&chapter),
            final_pdf: root.join("FinalPDFs").join(format!("{chapter}_Final.pdf")),
            root,
        }
    }
}

// ── YAML configuration file ──────────────────────────────────────────────

/// A YAML scalar that may be written either quoted or as a bare number,
/// e.g. `chapter_number: 12` and `chapter_number: "12"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StringOrNumber {
    Number(u64),
    Text(String),
}

impl StringOrNumber {
    /// Text as written. Bare numbers used as page indices lose their
    /// leading zeros in YAML, which is harmless since indices are re-padded.
    pub fn into_string(self) -> String {
        match self {
            StringOrNumber::Number(n) => n.to_string(),
            StringOrNumber::Text(s) => s,
        }
    }
}

/// On-disk configuration, typically `config.yaml`.
///
/// ```yaml
/// base_url: "https://cdn.example.com/series/0000-XXX.png"
/// chapter_number: 0
/// output_folder: "/data/webtoons/series"
/// start_num: "001"
/// keep_temp_files: false
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub chapter_number: Option<StringOrNumber>,
    pub output_folder: Option<PathBuf>,
    pub start_num: Option<StringOrNumber>,
    pub end_num: Option<StringOrNumber>,
    #[serde(default)]
    pub keep_temp_files: bool,
    #[serde(default)]
    pub keep_raw: bool,
    pub max_consecutive_failures: Option<u32>,
    pub min_slice_height: Option<u32>,
    pub band_height: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub pdfium_lib_path: Option<PathBuf>,
}

impl ConfigFile {
    /// Read and parse a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|e| match e {
            PipelineError::ConfigParse { detail, .. } => PipelineError::ConfigParse {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })
    }

    /// Parse YAML text. An empty document yields an empty file.
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| PipelineError::ConfigParse {
            path: PathBuf::new(),
            detail: e.to_string(),
        })
    }

    /// Check required keys and turn the file into a builder.
    pub fn into_builder(self) -> Result<ChapterConfigBuilder, PipelineError> {
        let base_url = self
            .base_url
            .filter(|s| !s.trim().is_empty())
            .ok_or(PipelineError::MissingField { field: "base_url" })?;
        let chapter_number = self
            .chapter_number
            .map(StringOrNumber::into_string)
            .ok_or(PipelineError::MissingField {
                field: "chapter_number",
            })?;
        let output_folder = self
            .output_folder
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(PipelineError::MissingField {
                field: "output_folder",
            })?;

        let mut builder = ChapterConfig::builder(base_url, chapter_number, output_folder)
            .keep_temp_files(self.keep_temp_files)
            .keep_raw(self.keep_raw);

        if let Some(start) = self.start_num {
            builder = builder.start_num(start.into_string());
        }
        if let Some(end) = self.end_num {
            builder = builder.end_num(end.into_string());
        }
        if let Some(n) = self.max_consecutive_failures {
            builder = builder.max_consecutive_failures(n);
        }
        if let Some(px) = self.min_slice_height {
            builder = builder.min_slice_height(px);
        }
        if let Some(px) = self.band_height {
            builder = builder.band_height(px);
        }
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout_secs(secs);
        }
        if let Some(path) = self.pdfium_lib_path {
            builder = builder.pdfium_lib_path(path);
        }
        Ok(builder)
    }
}
