//! End-to-end conversion of one page.
//!
//! ## Idempotency
//!
//! A page is identified by `(version_id, page_number)`. The worker first
//! looks that key up and returns the existing record untouched, so the
//! coordinator can re-run a whole document after a partial failure and only
//! the missing pages do any work. Two workers racing on the same key both
//! pass the pre-check; the store's compare-and-insert then rejects the
//! second insert and that worker returns the winner's id instead.
//!
//! ## Memory
//!
//! Each worker owns its own copy of the source bytes and the rendered PNG.
//! Both are moved into the call that consumes them (render, upload) and are
//! gone by the time the record is persisted.

use crate::config::{PipelineConfig, DEFAULT_SCALE_FACTOR};
use crate::error::{PageError, StoreError};
use crate::model::{DocumentPage, NewDocumentPage};
use crate::pipeline::encode::{page_file_name, PAGE_IMAGE_MIME};
use crate::pipeline::fetch::{redact_query, RetryingFetcher};
use crate::pipeline::render::{render_page, PageRenderer};
use crate::storage::{ObjectStorage, PutFileRequest};
use crate::store::RecordStore;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

static DOC_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(doc_[^/]+)/").unwrap_or_else(|e| panic!("invalid doc id pattern: {e}"))
});

/// Find the first `doc_<token>/` path segment in a source URL.
///
/// Used to namespace page uploads under the same document folder as the
/// source file. Returns None when the URL carries no such segment.
pub fn extract_doc_id(url: &str) -> Option<String> {
    DOC_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Input of one page task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertPagePayload {
    pub document_version_id: String,
    /// 1-based.
    pub page_number: u32,
    /// Fetchable URL of the source PDF.
    pub url: String,
    pub team_id: String,
}

/// Converts a single page: check, fetch, render, upload, persist.
#[derive(Clone)]
pub struct PageConversionWorker {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn ObjectStorage>,
    fetcher: RetryingFetcher,
    renderer: Arc<dyn PageRenderer>,
    config: PipelineConfig,
}

impl PageConversionWorker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        fetcher: RetryingFetcher,
        renderer: Arc<dyn PageRenderer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            storage,
            fetcher,
            renderer,
            config,
        }
    }

    /// Convert one page and return its page record id.
    ///
    /// Returns the existing id without any I/O beyond the lookup when the
    /// page was already converted.
    pub async fn convert_page(&self, payload: &ConvertPagePayload) -> Result<String, PageError> {
        let start = Instant::now();
        let page = payload.page_number;

        // ── Step 1: Idempotency check ────────────────────────────────────
        if let Some(existing) = self.existing_page(payload).await? {
            info!(
                "Page {} of version {} already exists ({})",
                page, payload.document_version_id, existing.id
            );
            return Ok(existing.id);
        }

        if page == 0 {
            return Err(PageError::OutOfRange { page, total: 0 });
        }

        // ── Step 2: Fetch source ─────────────────────────────────────────
        debug!("Page {}: fetching {}", page, redact_query(&payload.url));
        let pdf = self
            .fetcher
            .fetch_bytes(&payload.url, &self.config.page_fetch_retry, page)
            .await?;

        // ── Step 3: Render ───────────────────────────────────────────────
        let rendered = render_page(
            Arc::clone(&self.renderer),
            pdf,
            page - 1,
            DEFAULT_SCALE_FACTOR,
        )
        .await?;

        // ── Step 4: Namespace under the source document ──────────────────
        let doc_id = extract_doc_id(&payload.url);
        if doc_id.is_none() {
            debug!("Page {}: no doc_ segment in source URL", page);
        }

        // ── Step 5: Upload ───────────────────────────────────────────────
        let uploaded = self
            .storage
            .put_file(PutFileRequest {
                name: page_file_name(page),
                mime_type: PAGE_IMAGE_MIME.to_string(),
                bytes: rendered.png,
                team_id: payload.team_id.clone(),
                doc_id,
            })
            .await;

        let (storage_type, file) = match (uploaded.storage_type, uploaded.data) {
            (Some(t), Some(d)) => (t, d),
            _ => {
                return Err(PageError::Upload {
                    page,
                    detail: Some(format!("{} storage returned no location", self.storage.name())),
                })
            }
        };

        // ── Step 6: Persist ──────────────────────────────────────────────
        let created = self
            .store
            .create_page(NewDocumentPage {
                version_id: payload.document_version_id.clone(),
                page_number: page,
                file,
                storage_type,
                embedded_links: rendered.embedded_links,
            })
            .await;

        let record = match created {
            Ok(record) => record,
            Err(StoreError::UniqueViolation { .. }) => {
                warn!(
                    "Page {} of version {} was created concurrently; keeping the existing record",
                    page, payload.document_version_id
                );
                self.existing_page(payload).await?.ok_or_else(|| PageError::Persist {
                    page,
                    detail: "record vanished after unique violation".into(),
                })?
            }
            Err(e) => {
                return Err(PageError::Persist {
                    page,
                    detail: e.to_string(),
                })
            }
        };

        info!(
            "Page {} of version {} converted in {}ms ({} links)",
            page,
            payload.document_version_id,
            start.elapsed().as_millis(),
            record.embedded_links.len()
        );
        Ok(record.id)
    }

    async fn existing_page(
        &self,
        payload: &ConvertPagePayload,
    ) -> Result<Option<DocumentPage>, PageError> {
        self.store
            .find_page(&payload.document_version_id, payload.page_number)
            .await
            .map_err(|e| PageError::Persist {
                page: payload.page_number,
                detail: e.to_string(),
            })
    }
}
