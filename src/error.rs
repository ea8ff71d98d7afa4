//! Error types for the edgequake-pdf2pages library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal** for a document conversion: the version or
//!   its team is missing, the page count was never recorded, at least one
//!   page failed, or the finalisation transaction did not commit. Returned as
//!   `Err(PipelineError)` from [`crate::coordinator::BatchCoordinator`].
//!
//! * [`PageError`] — **Contained**: a single page failed (fetch, decode,
//!   render, upload). It is stored inside [`crate::model::ConversionResult`]
//!   and logged; sibling pages keep running. The batch only surfaces the
//!   aggregate [`PipelineError::BatchConversion`].
//!
//! The collaborator errors ([`StoreError`], [`StorageError`],
//! [`TransportError`]) are mapped into one of the two above at the boundary
//! where they occur.

use thiserror::Error;

/// All fatal errors returned by a document conversion.
///
/// Page-level failures use [`PageError`] and only escalate here as
/// [`PipelineError::BatchConversion`].
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Precondition errors ───────────────────────────────────────────────
    /// No document version with this id exists.
    #[error("Document version '{version_id}' not found")]
    VersionNotFound { version_id: String },

    /// The owning document has no team attached.
    #[error("Team not found for document '{document_id}' (version '{version_id}')")]
    TeamNotFound {
        version_id: String,
        document_id: String,
    },

    /// The version was stored without a page count.
    #[error("Number of pages not recorded for document version '{version_id}'")]
    MissingPageCount { version_id: String },

    /// The storage collaborator could not produce a download URL.
    #[error("Could not obtain a download URL for version '{version_id}': {source}")]
    SignedUrl {
        version_id: String,
        #[source]
        source: StorageError,
    },

    // ── Batch errors ──────────────────────────────────────────────────────
    /// At least one page task failed; finalisation was skipped.
    #[error("Failed to convert PDF to images: {failed}/{total} pages failed")]
    BatchConversion {
        failed: usize,
        total: usize,
        failed_pages: Vec<u32>,
    },

    /// The version-flag transaction did not commit.
    #[error("Failed to finalise document version '{version_id}': {source}")]
    Finalization {
        version_id: String,
        #[source]
        source: StoreError,
    },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The record store failed outside of a page task.
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A terminal error for a single page task.
///
/// Never retried at the page layer: transient HTTP failures have already
/// been absorbed by [`crate::pipeline::fetch::RetryingFetcher`] by the time
/// one of these is produced.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The source PDF could not be downloaded.
    #[error("Page {page}: failed to fetch PDF{}: {detail}", http_status_suffix(.status))]
    Fetch {
        page: u32,
        status: Option<u16>,
        detail: String,
    },

    /// The downloaded bytes are not a readable PDF.
    #[error("Page {page}: PDF could not be decoded: {detail}")]
    Decode { page: u32, detail: String },

    /// The page number exceeds the document's real page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    OutOfRange { page: u32, total: u32 },

    /// pdfium failed while rasterising or encoding the page.
    #[error("Page {page}: rasterisation failed: {detail}")]
    Render { page: u32, detail: String },

    /// pdfium could not be bound.
    #[error("PDF renderer unavailable: {0}")]
    RendererUnavailable(String),

    /// The storage collaborator returned no type or no locator.
    #[error("Failed to upload document page {page}{}", detail_suffix(.detail))]
    Upload { page: u32, detail: Option<String> },

    /// The page record could not be read or written.
    #[error("Page {page}: failed to persist page record: {detail}")]
    Persist { page: u32, detail: String },
}

impl PageError {
    /// 1-based page number the error refers to, when known.
    pub fn page(&self) -> Option<u32> {
        match self {
            PageError::Fetch { page, .. }
            | PageError::Decode { page, .. }
            | PageError::OutOfRange { page, .. }
            | PageError::Render { page, .. }
            | PageError::Upload { page, .. }
            | PageError::Persist { page, .. } => Some(*page),
            PageError::RendererUnavailable(_) => None,
        }
    }
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Errors raised by a [`crate::store::RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A page record for this key already exists.
    #[error("A page record already exists for version '{version_id}', page {page_number}")]
    UniqueViolation {
        version_id: String,
        page_number: u32,
    },

    /// A row referenced by a write does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The underlying database failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored column could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(String),
}

/// Errors raised by an [`crate::storage::ObjectStorage`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local filesystem failure.
    #[error("Storage I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The locator cannot be turned into a URL.
    #[error("Invalid storage locator '{0}'")]
    InvalidLocator(String),

    /// The public base URL cannot carry a path.
    #[error("Invalid public base URL '{0}'")]
    InvalidBaseUrl(String),
}

/// Errors raised by an [`crate::pipeline::fetch::HttpClient`] before any
/// HTTP status is available (DNS, connect, TLS, timeout, local file read).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request to '{url}' timed out")]
    Timeout { url: String },

    #[error("Request to '{url}' failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Unsupported URL '{0}'")]
    UnsupportedUrl(String),
}
