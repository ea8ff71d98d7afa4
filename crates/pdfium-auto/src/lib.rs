//! # pdfium-auto
//!
//! Fetches a prebuilt PDFium shared library from
//! [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//! on first use and keeps it in a per-user cache, so `pdf2pages` runs without
//! a system-wide libpdfium.
//!
//! ```rust,no_run
//! let path = pdfium_auto::ensure_pdfium_library(None)?;
//! println!("pdfium at {}", path.display());
//! # Ok::<(), pdfium_auto::PdfiumAutoError>(())
//! ```
//!
//! The cache lives at `<user cache dir>/pdf2pages/pdfium-<VERSION>/` unless
//! `PDFIUM_AUTO_CACHE_DIR` points elsewhere.

use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// pdfium-binaries release tag (`chromium/<VERSION>`).
pub const PDFIUM_VERSION: &str = "7690";

const RELEASE_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Progress observer: `(bytes_downloaded, total_bytes)`.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    #[error("No prebuilt PDFium for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cache directory {path:?}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive extraction failed: {0}")]
    Extract(String),
}

/// Release asset for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformAsset {
    pub archive: &'static str,
    pub entry: &'static str,
    pub file_name: &'static str,
}

const UNIX_SO: (&str, &str) = ("lib/libpdfium.so", "libpdfium.so");
const MAC_DYLIB: (&str, &str) = ("lib/libpdfium.dylib", "libpdfium.dylib");
const WIN_DLL: (&str, &str) = ("bin/pdfium.dll", "pdfium.dll");

/// Asset for an `(os, arch)` pair as reported by `std::env::consts`.
pub fn platform_asset(os: &str, arch: &str) -> Result<PlatformAsset, PdfiumAutoError> {
    let (archive, (entry, file_name)) = match (os, arch) {
        ("linux", "x86_64") => ("pdfium-linux-x64.tgz", UNIX_SO),
        ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", UNIX_SO),
        ("macos", "x86_64") => ("pdfium-mac-x64.tgz", MAC_DYLIB),
        ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", MAC_DYLIB),
        ("windows", "x86_64") => ("pdfium-win-x64.tgz", WIN_DLL),
        ("windows", "aarch64") => ("pdfium-win-arm64.tgz", WIN_DLL),
        ("windows", "x86") => ("pdfium-win-x86.tgz", WIN_DLL),
        _ => {
            return Err(PdfiumAutoError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };
    Ok(PlatformAsset {
        archive,
        entry,
        file_name,
    })
}

fn current_asset() -> Result<PlatformAsset, PdfiumAutoError> {
    platform_asset(std::env::consts::OS, std::env::consts::ARCH)
}

/// A versioned directory holding one extracted PDFium library.
#[derive(Debug, Clone)]
pub struct LibraryCache {
    dir: PathBuf,
}

impl LibraryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `PDFIUM_AUTO_CACHE_DIR`, else the platform cache dir, else a temp dir.
    pub fn default_location() -> Self {
        let base = std::env::var_os("PDFIUM_AUTO_CACHE_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|d| d.join("pdf2pages")))
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache").join("pdf2pages")))
            .unwrap_or_else(|| std::env::temp_dir().join("pdf2pages"));
        Self::new(base.join(format!("pdfium-{PDFIUM_VERSION}")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The extracted library, if already present.
    pub fn cached(&self) -> Option<PathBuf> {
        let path = self.dir.join(current_asset().ok()?.file_name);
        path.is_file().then_some(path)
    }

    /// Return the cached library, downloading and extracting it first when
    /// it is missing.
    pub fn ensure(
        &self,
        on_progress: Option<DownloadProgress<'_>>,
    ) -> Result<PathBuf, PdfiumAutoError> {
        if let Some(path) = self.cached() {
            debug!("Using cached PDFium at {}", path.display());
            return Ok(path);
        }
        let asset = current_asset()?;
        let url = format!(
            "{RELEASE_BASE_URL}/chromium%2F{PDFIUM_VERSION}/{}",
            asset.archive
        );
        info!("Downloading PDFium {} from {}", PDFIUM_VERSION, url);
        let archive = download(&url, on_progress)?;
        self.install(&archive, &asset)
    }

    /// Extract `asset.entry` from a `.tgz` into the cache. The library is
    /// unpacked under a `.partial` name and renamed into place.
    pub fn install(
        &self,
        archive: &[u8],
        asset: &PlatformAsset,
    ) -> Result<PathBuf, PdfiumAutoError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| PdfiumAutoError::CacheDir {
            path: self.dir.clone(),
            source,
        })?;
        let dest = self.dir.join(asset.file_name);
        let partial = self.dir.join(format!("{}.partial", asset.file_name));

        let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(archive));
        let entries = tarball
            .entries()
            .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;
            let matches = entry
                .path()
                .map(|p| p.to_string_lossy() == asset.entry)
                .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;
            if !matches {
                continue;
            }
            entry
                .unpack(&partial)
                .map_err(|e| PdfiumAutoError::Extract(format!("unpack {}: {e}", asset.entry)))?;
            std::fs::rename(&partial, &dest).map_err(|source| PdfiumAutoError::CacheDir {
                path: dest.clone(),
                source,
            })?;
            info!("PDFium cached at {}", dest.display());
            return Ok(dest);
        }
        Err(PdfiumAutoError::Extract(format!(
            "{} not found in archive",
            asset.entry
        )))
    }
}

/// Whether the default cache already holds a library for this platform.
pub fn is_pdfium_cached() -> bool {
    LibraryCache::default_location().cached().is_some()
}

/// Path to a usable PDFium library in the default cache, downloading it on
/// first call. Blocking.
pub fn ensure_pdfium_library(
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<PathBuf, PdfiumAutoError> {
    LibraryCache::default_location().ensure(on_progress)
}

fn download(
    url: &str,
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;
    let mut response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(PdfiumAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PdfiumAutoError::Download(format!("read {url}: {e}"))),
        };
        body.extend_from_slice(&chunk[..n]);
        if let Some(cb) = on_progress {
            cb(body.len() as u64, total);
        }
    }
    Ok(body)
}
