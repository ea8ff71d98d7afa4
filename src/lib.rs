//! # edgequake-pdf2pages
//!
//! Convert every page of an uploaded PDF into a stored PNG image plus a
//! page record listing the page's hyperlinks.
//!
//! ## Why per-page images?
//!
//! Viewers that show one page at a time should not download and parse a
//! whole PDF in the browser. Rendering each page ahead of time at a fixed
//! 216 DPI gives every page of a document the same resolution, and the
//! extracted link URIs let the viewer overlay clickable regions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document version id
//!  │
//!  ├─ 1. Resolve   version + team + recorded page count (record store)
//!  ├─ 2. Sign      time-limited source URL (object storage)
//!  ├─ 3. Fan out   one page task per page, bounded concurrency
//!  │     ├─ check     existing page record → done
//!  │     ├─ fetch     source PDF with 5xx backoff
//!  │     ├─ render    pdfium, spawn_blocking, PNG + link URIs
//!  │     ├─ upload    page-<n>.png under the source's doc_ folder
//!  │     └─ persist   compare-and-insert on (version, page)
//!  ├─ 4. Join      any failure → BatchConversion error, no finalisation
//!  ├─ 5. Finalise  has_pages + is_primary, demote other versions (atomic)
//!  └─ 6. Notify    best-effort revalidation webhook
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2pages::{BatchCoordinator, LocalObjectStorage, PipelineConfig, SqliteRecordStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteRecordStore::open("pages.db")?);
//!     let storage = Arc::new(LocalObjectStorage::new("./storage"));
//!     let coordinator = BatchCoordinator::with_defaults(store, storage, PipelineConfig::default())?;
//!     let summary = coordinator.convert_document("ver_123").await?;
//!     println!("{} pages converted", summary.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2pages` binary (clap + anyhow + tracing-subscriber + indicatif + pdfium-auto) |
//!
//! ```toml
//! edgequake-pdf2pages = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod coordinator;
pub mod error;
pub mod finalize;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod progress;
pub mod storage;
pub mod store;
pub mod tasks;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, RetryPolicy, DEFAULT_SCALE_FACTOR};
pub use coordinator::BatchCoordinator;
pub use error::{PageError, PipelineError, StorageError, StoreError, TransportError};
pub use finalize::DocumentFinalizer;
pub use model::{
    BatchOutcome, ConversionResult, ConversionSummary, Document, DocumentPage, DocumentVersion,
    NewDocumentPage, StorageType, Team, VersionFlagUpdate, VersionWithTeam,
};
pub use notify::RevalidationNotifier;
pub use pipeline::fetch::{HttpClient, HttpResponse, ReqwestHttpClient, RetryingFetcher};
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderedPage};
pub use pipeline::worker::{ConvertPagePayload, PageConversionWorker};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use storage::{LocalObjectStorage, ObjectStorage, PutFileRequest, PutFileResult};
pub use store::{InMemoryRecordStore, RecordStore, SqliteRecordStore};
pub use tasks::{TaskError, TaskOutput, TaskPayload, TaskRunner};
