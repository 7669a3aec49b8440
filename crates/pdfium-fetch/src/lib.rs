//! # pdfium-fetch
//!
//! Find a usable [PDFium](https://pdfium.googlesource.com/pdfium/) shared
//! library for `pdfium-render`, downloading and caching the platform build
//! the first time one is needed.
//!
//! Resolution order:
//!
//! 1. `PDFIUM_LIB_PATH` pointing at an existing library file.
//! 2. The per-release cache directory (see [`cache_dir`]).
//! 3. Download of the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    unpacked into the cache directory.
//!
//! ```rust,no_run
//! use pdfium_fetch::{bind_library, ensure_library};
//!
//! let path = ensure_library(Some(&|done, total| {
//!     eprint!("\r{done}/{} bytes", total.unwrap_or(0));
//! }))
//! .expect("pdfium unavailable");
//! let pdfium = bind_library(&path).expect("bind failed");
//! ```
//!
//! Environment variables:
//!
//! - `PDFIUM_LIB_PATH`: use this library file, never download.
//! - `WEBTOON2PDF_PDFIUM_CACHE`: override the cache root.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

/// pdfium-binaries release tag (`chromium/<tag>`) this crate downloads.
pub const PDFIUM_RELEASE: &str = "7690";

const RELEASES_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";
const CACHE_ENV: &str = "WEBTOON2PDF_PDFIUM_CACHE";

/// Errors raised while locating, downloading or binding PDFium.
#[derive(Error, Debug)]
pub enum PdfiumFetchError {
    #[error("no PDFium build is published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("cannot prepare PDFium cache directory '{path}': {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDFium download failed: {0}")]
    Download(String),

    #[error("PDFium archive could not be unpacked: {0}")]
    Unpack(String),

    #[error("failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

/// Where a resolved library came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    /// `PDFIUM_LIB_PATH` named an existing file.
    Environment(PathBuf),
    /// Found in the cache directory from an earlier download.
    Cache(PathBuf),
}

impl LibrarySource {
    pub fn path(&self) -> &Path {
        match self {
            LibrarySource::Environment(p) | LibrarySource::Cache(p) => p,
        }
    }
}

struct Platform {
    archive: &'static str,
    member: &'static str,
    file_name: &'static str,
}

impl Platform {
    fn current() -> Result<Self, PdfiumFetchError> {
        let (archive, member, file_name) = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            (os, arch) => {
                return Err(PdfiumFetchError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(Self {
            archive,
            member,
            file_name,
        })
    }

    fn download_url(&self) -> String {
        format!("{RELEASES_URL}/chromium%2F{PDFIUM_RELEASE}/{}", self.archive)
    }
}

/// Per-release cache directory.
///
/// Defaults to `<platform cache dir>/webtoon2pdf/pdfium-<release>/`;
/// `WEBTOON2PDF_PDFIUM_CACHE` replaces the `<platform cache dir>/webtoon2pdf`
/// prefix.
pub fn cache_dir() -> PathBuf {
    let root = match std::env::var_os(CACHE_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("webtoon2pdf"),
    };
    root.join(format!("pdfium-{PDFIUM_RELEASE}"))
}

/// Look for an already available library without touching the network.
pub fn locate() -> Option<LibrarySource> {
    if let Some(p) = std::env::var_os(LIB_PATH_ENV).map(PathBuf::from) {
        if p.is_file() {
            return Some(LibrarySource::Environment(p));
        }
    }
    let platform = Platform::current().ok()?;
    let cached = cache_dir().join(platform.file_name);
    cached.is_file().then_some(LibrarySource::Cache(cached))
}

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// Return a library path, downloading the platform build if nothing is
/// available locally.
///
/// `on_progress` receives `(bytes_so_far, content_length)` while the
/// archive streams in. The resolved path is memoised for the process.
pub fn ensure_library(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PdfiumFetchError> {
    if let Some(path) = RESOLVED.get() {
        return Ok(path.clone());
    }

    let path = match locate() {
        Some(source) => source.path().to_path_buf(),
        None => download_into_cache(on_progress)?,
    };

    let _ = RESOLVED.set(path.clone());
    Ok(path)
}

/// Bind `pdfium-render` to the library at `path`.
pub fn bind_library(path: &Path) -> Result<Pdfium, PdfiumFetchError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| PdfiumFetchError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// [`ensure_library`] followed by [`bind_library`], without progress output.
pub fn bind_default() -> Result<Pdfium, PdfiumFetchError> {
    let path = ensure_library(None)?;
    bind_library(&path)
}

fn download_into_cache(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PdfiumFetchError> {
    let platform = Platform::current()?;
    let dir = cache_dir();
    std::fs::create_dir_all(&dir).map_err(|source| PdfiumFetchError::CacheDir {
        path: dir.clone(),
        source,
    })?;

    let archive = download_archive(&platform.download_url(), on_progress)?;
    let dest = dir.join(platform.file_name);
    unpack_member(&archive, platform.member, &dest)?;
    Ok(dest)
}

fn download_archive(
    url: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<Vec<u8>, PdfiumFetchError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-fetch/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumFetchError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumFetchError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(PdfiumFetchError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut body = Vec::with_capacity(total.unwrap_or(32 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    let mut received: u64 = 0;

    loop {
        let n = match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PdfiumFetchError::Download(format!("read error: {e}"))),
        };
        body.extend_from_slice(&chunk[..n]);
        received += n as u64;
        if let Some(cb) = on_progress {
            cb(received, total);
        }
    }

    Ok(body)
}

/// Write the single archive entry named `member` to `dest`.
///
/// The entry is unpacked next to `dest` under a `.part` name and renamed
/// into place, so `dest` either holds the whole library or does not exist.
fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumFetchError> {
    let partial = partial_path(dest);
    let result = unpack_to(archive, member, &partial).and_then(|()| {
        std::fs::rename(&partial, dest)
            .map_err(|e| PdfiumFetchError::Unpack(format!("{}: {e}", dest.display())))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn unpack_to(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumFetchError> {
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| PdfiumFetchError::Unpack(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| PdfiumFetchError::Unpack(e.to_string()))?;
        let is_member = entry
            .path()
            .map(|p| p.to_string_lossy() == member)
            .map_err(|e| PdfiumFetchError::Unpack(e.to_string()))?;
        if is_member {
            entry
                .unpack(dest)
                .map_err(|e| PdfiumFetchError::Unpack(format!("{member}: {e}")))?;
            return Ok(());
        }
    }

    Err(PdfiumFetchError::Unpack(format!(
        "'{member}' is missing from the archive"
    )))
}
