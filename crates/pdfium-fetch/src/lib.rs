//! # pdfium-fetch
//!
//! Locate, download and bind a version-pinned [PDFium] build so that
//! `pdfium-render` works without a manual library install.
//!
//! Resolution order for [`fetch_library`]:
//!
//! 1. `PDFIUM_LIB_PATH` pointing at an existing file.
//! 2. The per-version cache directory, when its `VERSION` stamp matches
//!    [`PDFIUM_VERSION`].
//! 3. Download the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    extract the shared library into the cache and write the stamp.
//!
//! The stamp is the companion resource that ties a cached binary to the
//! release it came from. A library without a matching stamp is treated as
//! absent and fetched again.
//!
//! This crate does no memoisation of its own; callers that need
//! load-once semantics wrap [`fetch_library`] + [`bind`] in their own
//! single-flight guard.
//!
//! [PDFium]: https://pdfium.googlesource.com/pdfium/

use std::path::{Path, PathBuf};

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

/// pdfium-binaries release tag the cache and downloads are pinned to.
pub const PDFIUM_VERSION: &str = "7690";

const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

const STAMP_FILE: &str = "VERSION";

/// Errors returned while locating, downloading or binding PDFium.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive extraction failed: {0}")]
    Extract(String),

    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Platform table ───────────────────────────────────────────────────────────

/// Release asset and library names for one OS/arch pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub archive_name: &'static str,
    pub lib_path_in_archive: &'static str,
    pub lib_name: &'static str,
}

const fn entry(archive_name: &'static str, lib: &'static str, lib_name: &'static str) -> Platform {
    Platform {
        archive_name,
        lib_path_in_archive: lib,
        lib_name,
    }
}

const PLATFORMS: &[(&str, &str, Platform)] = &[
    ("macos", "aarch64", entry("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib")),
    ("macos", "x86_64", entry("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib")),
    ("linux", "x86_64", entry("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so")),
    ("linux", "aarch64", entry("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so")),
    ("windows", "x86_64", entry("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll")),
    ("windows", "aarch64", entry("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll")),
    ("windows", "x86", entry("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll")),
];

impl Platform {
    /// Look up the entry for an explicit OS/arch pair.
    pub fn lookup(os: &str, arch: &str) -> Result<Platform, FetchError> {
        PLATFORMS
            .iter()
            .find(|(o, a, _)| *o == os && *a == arch)
            .map(|(_, _, p)| *p)
            .ok_or_else(|| FetchError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
    }

    /// Entry for the platform this binary was compiled for.
    pub fn current() -> Result<Platform, FetchError> {
        Self::lookup(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Download URL of this platform's archive at [`PDFIUM_VERSION`].
    pub fn download_url(&self) -> String {
        format!(
            "{}/chromium%2F{}/{}",
            BASE_URL, PDFIUM_VERSION, self.archive_name
        )
    }
}

// ── Locations ────────────────────────────────────────────────────────────────

/// Where a usable library was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibrarySource {
    /// `PDFIUM_LIB_PATH` override.
    Env,
    /// Previously downloaded into the cache directory.
    Cache,
    /// Downloaded during this call.
    Downloaded,
}

/// A PDFium shared library on disk plus the release it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLocation {
    pub path: PathBuf,
    /// `None` for an env override, whose release is unknown.
    pub version: Option<String>,
    pub source: LibrarySource,
}

/// Per-version cache directory.
///
/// `PDFIUM_FETCH_CACHE_DIR` replaces the platform cache root when set.
pub fn cache_dir() -> PathBuf {
    let base = match std::env::var("PDFIUM_FETCH_CACHE_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("resume-review"),
    };
    versioned_dir(&base)
}

fn versioned_dir(base: &Path) -> PathBuf {
    base.join(format!("pdfium-{PDFIUM_VERSION}"))
}

/// Read the stamp next to a cached library, if any.
pub fn read_stamp(dir: &Path) -> Option<String> {
    std::fs::read_to_string(dir.join(STAMP_FILE))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Find a usable library without touching the network.
pub fn locate() -> Option<LibraryLocation> {
    if let Some(loc) = env_override() {
        return Some(loc);
    }
    let platform = Platform::current().ok()?;
    locate_in(&cache_dir(), &platform)
}

fn env_override() -> Option<LibraryLocation> {
    let path = PathBuf::from(std::env::var("PDFIUM_LIB_PATH").ok()?);
    if path.exists() {
        Some(LibraryLocation {
            path,
            version: None,
            source: LibrarySource::Env,
        })
    } else {
        warn!(
            "PDFIUM_LIB_PATH '{}' does not exist; ignoring override",
            path.display()
        );
        None
    }
}

fn locate_in(dir: &Path, platform: &Platform) -> Option<LibraryLocation> {
    let path = dir.join(platform.lib_name);
    if !path.exists() {
        return None;
    }
    match read_stamp(dir) {
        Some(v) if v == PDFIUM_VERSION => Some(LibraryLocation {
            path,
            version: Some(v),
            source: LibrarySource::Cache,
        }),
        other => {
            debug!(
                "Cached pdfium at {} has stamp {:?}, expected {}",
                path.display(),
                other,
                PDFIUM_VERSION
            );
            None
        }
    }
}

/// Resolve a library, downloading the pinned release when nothing usable is
/// on disk.
pub async fn fetch_library(client: &reqwest::Client) -> Result<LibraryLocation, FetchError> {
    if let Some(loc) = env_override() {
        return Ok(loc);
    }
    let platform = Platform::current()?;
    fetch_into(client, &cache_dir(), &platform).await
}

async fn fetch_into(
    client: &reqwest::Client,
    dir: &Path,
    platform: &Platform,
) -> Result<LibraryLocation, FetchError> {
    if let Some(loc) = locate_in(dir, platform) {
        return Ok(loc);
    }

    let url = platform.download_url();
    info!("Downloading pdfium {} from {}", PDFIUM_VERSION, url);

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(FetchError::CacheDir)?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| FetchError::Download(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(FetchError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }
    let archive = response
        .bytes()
        .await
        .map_err(|e| FetchError::Download(format!("Read error: {e}")))?;
    debug!("Downloaded {} bytes", archive.len());

    let dest = dir.join(platform.lib_name);
    let inner = platform.lib_path_in_archive;
    let dest_clone = dest.clone();
    tokio::task::spawn_blocking(move || extract_library(&archive, inner, &dest_clone))
        .await
        .map_err(|e| FetchError::Extract(format!("extract task panicked: {e}")))??;

    tokio::fs::write(dir.join(STAMP_FILE), PDFIUM_VERSION)
        .await
        .map_err(FetchError::CacheDir)?;

    Ok(LibraryLocation {
        path: dest,
        version: Some(PDFIUM_VERSION.to_string()),
        source: LibrarySource::Downloaded,
    })
}

/// Bind `pdfium-render` to the library at `location`.
pub fn bind(location: &LibraryLocation) -> Result<Pdfium, FetchError> {
    Pdfium::bind_to_library(&location.path)
        .map(Pdfium::new)
        .map_err(|e| FetchError::Bind {
            path: location.path.clone(),
            reason: e.to_string(),
        })
}

/// Pull a single entry out of a gzipped tarball.
fn extract_library(archive: &[u8], entry_name: &str, dest: &Path) -> Result<(), FetchError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut tarball = Archive::new(GzDecoder::new(archive));
    let entries = tarball
        .entries()
        .map_err(|e| FetchError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| FetchError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p.to_string_lossy() == entry_name)
            .map_err(|e| FetchError::Extract(e.to_string()))?;
        if matches {
            entry
                .unpack(dest)
                .map_err(|e| FetchError::Extract(format!("Unpack failed: {e}")))?;
            return Ok(());
        }
    }

    Err(FetchError::Extract(format!(
        "'{entry_name}' not found in archive"
    )))
}
