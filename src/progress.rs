//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events while a batch runs. The callback is the only place per-page
//! outcomes are surfaced individually; the coordinator itself returns a
//! single summarising result.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2pages::{BatchProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_number: u32, total_pages: u32, page_id: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} stored as {}", page_number, total_pages, page_id);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch coordinator as it processes each page.
///
/// Page events may arrive concurrently and in any order; implementations
/// must protect shared mutable state themselves.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after preconditions pass and before any page is dispatched.
    fn on_batch_start(&self, total_pages: u32) {
        let _ = total_pages;
    }

    /// Called when a page task begins.
    fn on_page_start(&self, page_number: u32, total_pages: u32) {
        let _ = (page_number, total_pages);
    }

    /// Called when a page task yields a page id (new or pre-existing).
    fn on_page_complete(&self, page_number: u32, total_pages: u32, page_id: &str) {
        let _ = (page_number, total_pages, page_id);
    }

    /// Called when a page task fails terminally.
    fn on_page_error(&self, page_number: u32, total_pages: u32, error: &str) {
        let _ = (page_number, total_pages, error);
    }

    /// Called once after every page task has settled.
    fn on_batch_complete(&self, total_pages: u32, success_count: u32) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
