//! Document-level conversion: fan pages out, join, then finalise.
//!
//! ## Why join instead of fire-and-forget?
//!
//! Finalisation marks a version as primary, which makes its pages visible to
//! readers. That must only happen once every page record exists, so the
//! coordinator waits for every page task to settle before deciding anything.
//! A failed page does not cancel its siblings: each page task is idempotent,
//! and the pages that did succeed are kept so a re-run only redoes the rest.
//!
//! ## Why a concurrency bound?
//!
//! Every page of the version is dispatched as part of the same batch, but
//! each task holds a full copy of the source PDF plus a raster while it runs.
//! `buffer_unordered(config.concurrency)` keeps that peak bounded on large
//! documents.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, TransportError};
use crate::finalize::DocumentFinalizer;
use crate::model::{BatchOutcome, ConversionResult, ConversionSummary};
use crate::notify::RevalidationNotifier;
use crate::pipeline::fetch::{HttpClient, ReqwestHttpClient, RetryingFetcher};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::worker::{ConvertPagePayload, PageConversionWorker};
use crate::storage::ObjectStorage;
use crate::store::RecordStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Converts every page of a document version and promotes it on success.
#[derive(Clone)]
pub struct BatchCoordinator {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn ObjectStorage>,
    worker: PageConversionWorker,
    finalizer: DocumentFinalizer,
    notifier: RevalidationNotifier,
    config: PipelineConfig,
}

impl BatchCoordinator {
    /// Wire a coordinator from explicit collaborators.
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        http: Arc<dyn HttpClient>,
        renderer: Arc<dyn PageRenderer>,
        config: PipelineConfig,
    ) -> Self {
        let fetcher = RetryingFetcher::new(http);
        let worker = PageConversionWorker::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            fetcher.clone(),
            renderer,
            config.clone(),
        );
        Self {
            finalizer: DocumentFinalizer::new(Arc::clone(&store)),
            notifier: RevalidationNotifier::new(fetcher, &config),
            store,
            storage,
            worker,
            config,
        }
    }

    /// Wire a coordinator with the production HTTP client and pdfium renderer.
    pub fn with_defaults(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        config: PipelineConfig,
    ) -> Result<Self, TransportError> {
        let http = Arc::new(ReqwestHttpClient::new(config.request_timeout())?);
        let renderer: Arc<dyn PageRenderer> = match &config.pdfium_lib_path {
            Some(path) => Arc::new(PdfiumRenderer::with_library(path)),
            None => Arc::new(PdfiumRenderer::new()),
        };
        Ok(Self::new(store, storage, http, renderer, config))
    }

    /// The page worker used for every page of a batch.
    pub fn worker(&self) -> &PageConversionWorker {
        &self.worker
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert all pages of `version_id`.
    ///
    /// # Errors
    /// - [`PipelineError::VersionNotFound`] / [`PipelineError::TeamNotFound`]
    ///   before anything is dispatched
    /// - [`PipelineError::MissingPageCount`] when the version has no page count
    /// - [`PipelineError::BatchConversion`] when at least one page failed;
    ///   pages that succeeded are kept
    /// - [`PipelineError::Finalization`] when the flag transaction failed
    pub async fn convert_document(
        &self,
        version_id: &str,
    ) -> Result<ConversionSummary, PipelineError> {
        let start = Instant::now();
        info!("Starting conversion of document version {}", version_id);

        // ── Step 1: Resolve version and team ─────────────────────────────
        let found = self
            .store
            .find_version(version_id)
            .await?
            .ok_or_else(|| PipelineError::VersionNotFound {
                version_id: version_id.to_string(),
            })
            .inspect_err(|e| error!("{}", e))?;

        let team = found
            .team
            .ok_or_else(|| PipelineError::TeamNotFound {
                version_id: version_id.to_string(),
                document_id: found.document.id.clone(),
            })
            .inspect_err(|e| error!("{}", e))?;
        let version = found.version;

        // ── Step 2: Require a recorded page count ────────────────────────
        // A count of zero is treated as never recorded.
        let total = version
            .num_pages
            .filter(|n| *n > 0)
            .ok_or_else(|| PipelineError::MissingPageCount {
                version_id: version_id.to_string(),
            })
            .inspect_err(|e| error!("{}", e))?;

        // ── Step 3: Signed source URL ────────────────────────────────────
        let url = self
            .storage
            .signed_download_url(version.storage_type, &version.file, self.config.signed_url_ttl())
            .await
            .map_err(|source| PipelineError::SignedUrl {
                version_id: version_id.to_string(),
                source,
            })?;

        // ── Step 4: Fan out and join ─────────────────────────────────────
        let outcome = self.run_batch(version_id, &team.id, &url, total).await;
        if !outcome.all_succeeded() {
            let failed_pages = outcome.failed_pages();
            let err = PipelineError::BatchConversion {
                failed: failed_pages.len(),
                total: outcome.total(),
                failed_pages,
            };
            error!("Version {}: {}", version_id, err);
            return Err(err);
        }

        // ── Step 5: Finalise ─────────────────────────────────────────────
        self.finalizer.finalize_version(&version).await?;

        // ── Step 6: Best-effort notification ─────────────────────────────
        let revalidated = self.notifier.notify(&version.document_id).await;

        let summary = ConversionSummary {
            version_id: version.id.clone(),
            document_id: version.document_id.clone(),
            total_pages: total,
            page_ids: outcome.page_ids(),
            revalidated,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Converted {} pages of version {} in {}ms",
            summary.total_pages, summary.version_id, summary.duration_ms
        );
        Ok(summary)
    }

    /// Dispatch one page task per page in `1..=total` and wait for all.
    async fn run_batch(&self, version_id: &str, team_id: &str, url: &str, total: u32) -> BatchOutcome {
        let cb = self.config.progress_callback.clone();
        if let Some(ref cb) = cb {
            cb.on_batch_start(total);
        }
        debug!(
            "Dispatching {} page tasks for version {} ({} in flight)",
            total, version_id, self.config.concurrency
        );

        let results: Vec<ConversionResult> = stream::iter(1..=total)
            .map(|page_number| {
                let worker = self.worker.clone();
                let cb = cb.clone();
                let payload = ConvertPagePayload {
                    document_version_id: version_id.to_string(),
                    page_number,
                    url: url.to_string(),
                    team_id: team_id.to_string(),
                };
                async move {
                    if let Some(ref cb) = cb {
                        cb.on_page_start(page_number, total);
                    }
                    match worker.convert_page(&payload).await {
                        Ok(page_id) => {
                            if let Some(ref cb) = cb {
                                cb.on_page_complete(page_number, total, &page_id);
                            }
                            ConversionResult::ok(page_number, page_id)
                        }
                        Err(e) => {
                            warn!("Version {}: {}", payload.document_version_id, e);
                            if let Some(ref cb) = cb {
                                cb.on_page_error(page_number, total, &e.to_string());
                            }
                            ConversionResult::failed(page_number, e)
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let outcome = BatchOutcome::new(results);
        if let Some(ref cb) = cb {
            cb.on_batch_complete(total, outcome.succeeded() as u32);
        }
        outcome
    }
}
