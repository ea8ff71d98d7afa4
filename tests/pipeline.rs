//! Integration tests for document and page conversion.
//!
//! pdfium and the network are replaced by in-process fakes so these run
//! anywhere. Backoff timing runs on tokio's paused clock.

use async_trait::async_trait;
use edgequake_pdf2pages::{
    BatchCoordinator, BatchProgressCallback, ConvertPagePayload, Document, DocumentVersion,
    HttpClient, HttpResponse, InMemoryRecordStore, LocalObjectStorage, PageError, PageRenderer,
    PipelineConfig, PipelineError, RecordStore, RenderedPage, ReqwestHttpClient,
    SqliteRecordStore, StorageType, TaskOutput, TaskRunner, Team, TransportError,
    DEFAULT_SCALE_FACTOR,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const SOURCE_URL: &str = "https://files.test/team_1/doc_src/deck.pdf";
const REVALIDATE_BASE: &str = "https://app.test";

// ── Fakes ────────────────────────────────────────────────────────────────────

/// HTTP fake answering from a per-URL-prefix script.
///
/// Each prefix maps to a list of statuses consumed in order; the last one
/// repeats once the list is exhausted.
#[derive(Default)]
struct ScriptedHttp {
    scripts: Mutex<HashMap<String, Vec<u16>>>,
    /// Fail the n-th source request (1-based) with this status.
    fail_source_call: Mutex<Option<(usize, u16)>>,
    source_calls: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHttp {
    fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(self: Arc<Self>, prefix: &str, statuses: &[u16]) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(prefix.to_string(), statuses.to_vec());
        self
    }

    fn fail_nth_source_call(self: Arc<Self>, n: usize, status: u16) -> Arc<Self> {
        *self.fail_source_call.lock().unwrap() = Some((n, status));
        self
    }

    fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());

        if url.starts_with(SOURCE_URL) {
            let n = self.source_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((fail_at, status)) = *self.fail_source_call.lock().unwrap() {
                if n == fail_at {
                    return Ok(HttpResponse {
                        status,
                        body: vec![],
                    });
                }
            }
        }

        let mut scripts = self.scripts.lock().unwrap();
        let status = scripts
            .iter_mut()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, statuses)| {
                if statuses.len() > 1 {
                    statuses.remove(0)
                } else {
                    statuses[0]
                }
            })
            .unwrap_or(200);

        Ok(HttpResponse {
            status,
            body: if status == 200 { b"%PDF-1.7 fake".to_vec() } else { vec![] },
        })
    }
}

/// Renderer fake with a fixed page count and per-page link lists. Records
/// the `(page_index, scale)` of every render.
struct FakeRenderer {
    pages: u32,
    links: HashMap<u32, Vec<String>>,
    renders: AtomicU32,
    scales: Mutex<Vec<(u32, f32)>>,
}

impl FakeRenderer {
    fn new(pages: u32) -> Arc<Self> {
        Arc::new(Self {
            pages,
            links: HashMap::new(),
            renders: AtomicU32::new(0),
            scales: Mutex::new(vec![]),
        })
    }

    fn with_links(pages: u32, index: u32, links: &[&str]) -> Arc<Self> {
        let mut map = HashMap::new();
        map.insert(index, links.iter().map(|s| s.to_string()).collect());
        Arc::new(Self {
            pages,
            links: map,
            renders: AtomicU32::new(0),
            scales: Mutex::new(vec![]),
        })
    }
}

impl PageRenderer for FakeRenderer {
    fn page_count(&self, _pdf: &[u8]) -> Result<u32, PageError> {
        Ok(self.pages)
    }

    fn render(&self, _pdf: &[u8], page_index: u32, scale: f32) -> Result<RenderedPage, PageError> {
        self.scales.lock().unwrap().push((page_index, scale));
        if page_index >= self.pages {
            return Err(PageError::OutOfRange {
                page: page_index + 1,
                total: self.pages,
            });
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(RenderedPage {
            png: vec![0x89, b'P', b'N', b'G', page_index as u8],
            embedded_links: self.links.get(&page_index).cloned().unwrap_or_default(),
            width: 10,
            height: 10,
        })
    }
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicU32,
    completed: AtomicU32,
    errors: AtomicU32,
    finished: Mutex<Option<(u32, u32)>>,
}

impl BatchProgressCallback for CountingProgress {
    fn on_page_start(&self, _page: u32, _total: u32) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_complete(&self, _page: u32, _total: u32, _page_id: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page: u32, _total: u32, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, total: u32, success_count: u32) {
        *self.finished.lock().unwrap() = Some((total, success_count));
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn version(id: &str, number: u32, num_pages: Option<u32>, primary: bool) -> DocumentVersion {
    DocumentVersion {
        id: id.into(),
        document_id: "doc_src".into(),
        version_number: number,
        num_pages,
        file: SOURCE_URL.into(),
        storage_type: StorageType::Url,
        has_pages: primary,
        is_primary: primary,
    }
}

/// Team, document, a primary v1 and a fresh v2 with `num_pages`.
async fn seed(store: &dyn RecordStore, num_pages: Option<u32>) {
    store
        .insert_team(Team {
            id: "team_1".into(),
            name: "Acme".into(),
        })
        .await
        .unwrap();
    store
        .insert_document(Document {
            id: "doc_src".into(),
            name: "Deck".into(),
            team_id: Some("team_1".into()),
        })
        .await
        .unwrap();
    store
        .insert_version(version("ver_1", 1, Some(1), true))
        .await
        .unwrap();
    store
        .insert_version(version("ver_2", 2, num_pages, false))
        .await
        .unwrap();
}

struct Harness {
    store: Arc<dyn RecordStore>,
    http: Arc<ScriptedHttp>,
    coordinator: BatchCoordinator,
    storage_dir: tempfile::TempDir,
}

fn harness(
    store: Arc<dyn RecordStore>,
    http: Arc<ScriptedHttp>,
    renderer: Arc<FakeRenderer>,
    config: PipelineConfig,
) -> Harness {
    let storage_dir = tempfile::tempdir().unwrap();
    let coordinator = BatchCoordinator::new(
        Arc::clone(&store),
        Arc::new(LocalObjectStorage::new(storage_dir.path())),
        http.clone(),
        renderer,
        config,
    );
    Harness {
        store,
        http,
        coordinator,
        storage_dir,
    }
}

fn page_payload(page_number: u32) -> ConvertPagePayload {
    ConvertPagePayload {
        document_version_id: "ver_2".into(),
        page_number,
        url: SOURCE_URL.into(),
        team_id: "team_1".into(),
    }
}

fn primaries(versions: &[DocumentVersion]) -> Vec<&str> {
    versions
        .iter()
        .filter(|v| v.is_primary)
        .map(|v| v.id.as_str())
        .collect()
}

// ── Page worker ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn converting_a_page_twice_returns_the_same_record() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(3)).await;
    let renderer = FakeRenderer::new(3);
    let h = harness(store, ScriptedHttp::ok(), renderer.clone(), PipelineConfig::default());

    let worker = h.coordinator.worker();
    let first = assert_ok!(worker.convert_page(&page_payload(2)).await);
    let second = assert_ok!(worker.convert_page(&page_payload(2)).await);

    assert_eq!(first, second);
    assert_eq!(h.store.list_pages("ver_2").await.unwrap().len(), 1);
    // The second call stops at the lookup.
    assert_eq!(h.http.calls_to(SOURCE_URL), 1);
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_conversions_of_one_page_store_one_record() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(3)).await;
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(3), PipelineConfig::default());

    let a = h.coordinator.worker().clone();
    let b = h.coordinator.worker().clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.convert_page(&page_payload(1)).await }),
        tokio::spawn(async move { b.convert_page(&page_payload(1)).await }),
    );

    let id_a = ra.unwrap().unwrap();
    let id_b = rb.unwrap().unwrap();
    assert_eq!(id_a, id_b);
    assert_eq!(h.store.list_pages("ver_2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn page_links_are_stored_in_discovery_order() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(2)).await;
    let renderer = FakeRenderer::with_links(
        2,
        1,
        &["https://example.com/pricing", "mailto:sales@example.com"],
    );
    let h = harness(store, ScriptedHttp::ok(), renderer, PipelineConfig::default());

    assert_ok!(h.coordinator.worker().convert_page(&page_payload(2)).await);

    let page = h.store.find_page("ver_2", 2).await.unwrap().unwrap();
    assert_eq!(
        page.embedded_links,
        vec![
            "https://example.com/pricing".to_string(),
            "mailto:sales@example.com".to_string()
        ]
    );
}

#[tokio::test]
async fn uploaded_page_lands_under_the_source_doc_folder() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(1)).await;
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(1), PipelineConfig::default());

    assert_ok!(h.coordinator.worker().convert_page(&page_payload(1)).await);

    let page = h.store.find_page("ver_2", 1).await.unwrap().unwrap();
    assert_eq!(page.file, "team_1/doc_src/page-1.png");
    assert_eq!(page.storage_type, StorageType::Local);
    assert!(h.storage_dir.path().join(&page.file).exists());
}

#[tokio::test]
async fn page_beyond_document_is_out_of_range() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(2)).await;
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(2), PipelineConfig::default());

    let err = assert_err!(h.coordinator.worker().convert_page(&page_payload(3)).await);
    assert!(matches!(err, PageError::OutOfRange { page: 3, total: 2 }));
    assert!(h.store.list_pages("ver_2").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn persistent_503_gives_up_after_five_attempts() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(1)).await;
    let http = ScriptedHttp::ok().script(SOURCE_URL, &[503, 503, 503, 503, 503, 503]);
    let h = harness(store, http, FakeRenderer::new(1), PipelineConfig::default());

    let start = tokio::time::Instant::now();
    let err = assert_err!(h.coordinator.worker().convert_page(&page_payload(1)).await);
    let waited = start.elapsed();

    assert!(matches!(err, PageError::Fetch { status: Some(503), .. }));
    assert_eq!(h.http.calls_to(SOURCE_URL), 5);
    // Four sleeps: 1s + 2s + 4s + 8s before jitter, each at most doubled
    // and capped at 10s.
    assert!(waited >= Duration::from_secs(15), "waited {waited:?}");
    assert!(waited <= Duration::from_secs(24), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn transient_503_recovers() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(1)).await;
    let http = ScriptedHttp::ok().script(SOURCE_URL, &[503, 502, 200]);
    let h = harness(store, http, FakeRenderer::new(1), PipelineConfig::default());

    assert_ok!(h.coordinator.worker().convert_page(&page_payload(1)).await);
    assert_eq!(h.http.calls_to(SOURCE_URL), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(1)).await;
    let http = ScriptedHttp::ok().script(SOURCE_URL, &[403]);
    let h = harness(store, http, FakeRenderer::new(1), PipelineConfig::default());

    let err = assert_err!(h.coordinator.worker().convert_page(&page_payload(1)).await);
    assert!(matches!(err, PageError::Fetch { status: Some(403), .. }));
    assert_eq!(h.http.calls_to(SOURCE_URL), 1);
}

// ── Batch coordinator ────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failed_page_fails_the_batch_and_keeps_the_rest() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(10)).await;
    let progress = Arc::new(CountingProgress::default());
    // One page task at a time, so the third source request belongs to page 3.
    let config = PipelineConfig::builder()
        .concurrency(1)
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let http = ScriptedHttp::ok().fail_nth_source_call(3, 404);
    let h = harness(store, http, FakeRenderer::new(10), config);

    let err = assert_err!(h.coordinator.convert_document("ver_2").await);
    match err {
        PipelineError::BatchConversion {
            failed,
            total,
            failed_pages,
        } => {
            assert_eq!((failed, total), (1, 10));
            assert_eq!(failed_pages, vec![3]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let stored: Vec<u32> = h
        .store
        .list_pages("ver_2")
        .await
        .unwrap()
        .iter()
        .map(|p| p.page_number)
        .collect();
    assert_eq!(stored, vec![1, 2, 4, 5, 6, 7, 8, 9, 10]);

    // No finalisation: v1 is still the primary version.
    let versions = h.store.list_versions("doc_src").await.unwrap();
    assert_eq!(primaries(&versions), vec!["ver_1"]);
    assert!(!versions[1].has_pages);

    assert_eq!(progress.started.load(Ordering::SeqCst), 10);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 9);
    assert_eq!(progress.errors.load(Ordering::SeqCst), 1);
    assert_eq!(*progress.finished.lock().unwrap(), Some((10, 9)));
}

#[tokio::test]
async fn rerun_after_partial_failure_only_converts_missing_pages() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(4)).await;
    let config = PipelineConfig::builder().concurrency(1).build().unwrap();
    let http = ScriptedHttp::ok().fail_nth_source_call(2, 404);
    let renderer = FakeRenderer::new(4);
    let h = harness(store, http, renderer.clone(), config);

    assert_err!(h.coordinator.convert_document("ver_2").await);
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 3);

    let summary = assert_ok!(h.coordinator.convert_document("ver_2").await);
    assert_eq!(summary.page_ids.len(), 4);
    // Only page 2 was rendered again.
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn rerun_with_different_config_renders_at_the_same_scale() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(3)).await;
    let renderer = FakeRenderer::new(3);

    let first = harness(
        Arc::clone(&store),
        ScriptedHttp::ok().fail_nth_source_call(2, 404),
        renderer.clone(),
        PipelineConfig::builder().concurrency(1).build().unwrap(),
    );
    assert_err!(first.coordinator.convert_document("ver_2").await);

    let second = harness(
        store,
        ScriptedHttp::ok(),
        renderer.clone(),
        PipelineConfig::builder().concurrency(8).build().unwrap(),
    );
    assert_ok!(second.coordinator.convert_document("ver_2").await);

    let scales = renderer.scales.lock().unwrap().clone();
    assert_eq!(
        scales,
        vec![
            (0, DEFAULT_SCALE_FACTOR),
            (2, DEFAULT_SCALE_FACTOR),
            (1, DEFAULT_SCALE_FACTOR)
        ]
    );
    assert_eq!(DEFAULT_SCALE_FACTOR, 3.0);
}

#[tokio::test]
async fn success_promotes_the_version_and_demotes_the_others() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(3)).await;
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(3), PipelineConfig::default());

    let summary = assert_ok!(h.coordinator.convert_document("ver_2").await);
    assert_eq!(summary.total_pages, 3);
    assert_eq!(summary.document_id, "doc_src");

    let versions = h.store.list_versions("doc_src").await.unwrap();
    assert_eq!(primaries(&versions), vec!["ver_2"]);
    assert!(versions.iter().find(|v| v.id == "ver_2").unwrap().has_pages);
}

#[tokio::test]
async fn missing_page_count_dispatches_nothing() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), None).await;
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(3), PipelineConfig::default());

    let err = assert_err!(h.coordinator.convert_document("ver_2").await);
    assert!(matches!(err, PipelineError::MissingPageCount { .. }));
    assert!(h.store.list_pages("ver_2").await.unwrap().is_empty());
    assert!(h.http.calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_revalidation_does_not_fail_the_conversion() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(2)).await;
    let config = PipelineConfig::builder()
        .revalidate_url(REVALIDATE_BASE)
        .revalidate_token("s3cret")
        .build()
        .unwrap();
    let http = ScriptedHttp::ok().script(REVALIDATE_BASE, &[500]);
    let h = harness(store, http, FakeRenderer::new(2), config);

    let summary = assert_ok!(h.coordinator.convert_document("ver_2").await);
    assert!(!summary.revalidated);
    // Default outbound policy: three attempts.
    assert_eq!(h.http.calls_to(REVALIDATE_BASE), 3);

    let versions = h.store.list_versions("doc_src").await.unwrap();
    assert_eq!(primaries(&versions), vec!["ver_2"]);
}

#[tokio::test]
async fn revalidation_targets_the_document() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(1)).await;
    let config = PipelineConfig::builder()
        .revalidate_url(REVALIDATE_BASE)
        .revalidate_token("s3cret")
        .build()
        .unwrap();
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(1), config);

    let summary = assert_ok!(h.coordinator.convert_document("ver_2").await);
    assert!(summary.revalidated);
    let calls = h.http.calls.lock().unwrap();
    assert!(calls.contains(
        &"https://app.test/api/revalidate?secret=s3cret&documentId=doc_src".to_string()
    ));
}

// ── SQLite store and local files ─────────────────────────────────────────────

#[tokio::test]
async fn sqlite_store_keeps_batch_results() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> =
        Arc::new(SqliteRecordStore::open(dir.path().join("pages.db")).unwrap());
    seed(store.as_ref(), Some(5)).await;
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(5), PipelineConfig::default());

    let summary = assert_ok!(h.coordinator.convert_document("ver_2").await);
    assert_eq!(summary.page_ids.len(), 5);

    let pages = h.store.list_pages("ver_2").await.unwrap();
    assert_eq!(pages.len(), 5);
    let versions = h.store.list_versions("doc_src").await.unwrap();
    assert_eq!(primaries(&versions), vec!["ver_2"]);
}

#[tokio::test]
async fn locally_stored_source_is_read_through_file_urls() {
    let root = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalObjectStorage::new(root.path()));
    let locator = storage
        .put_source("team_1", "doc_local", "source.pdf", b"%PDF-1.7 local")
        .await
        .unwrap();

    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(1)).await;
    store
        .insert_version(DocumentVersion {
            id: "ver_local".into(),
            document_id: "doc_src".into(),
            version_number: 3,
            num_pages: Some(2),
            file: locator,
            storage_type: StorageType::Local,
            has_pages: false,
            is_primary: false,
        })
        .await
        .unwrap();

    let coordinator = BatchCoordinator::new(
        Arc::clone(&store),
        storage,
        Arc::new(ReqwestHttpClient::new(Duration::from_secs(5)).unwrap()),
        FakeRenderer::new(2),
        PipelineConfig::default(),
    );
    let summary = assert_ok!(coordinator.convert_document("ver_local").await);
    assert_eq!(summary.page_ids.len(), 2);

    let page = store.find_page("ver_local", 2).await.unwrap().unwrap();
    assert_eq!(page.file, "team_1/doc_local/page-2.png");
    assert!(root.path().join(&page.file).exists());
}

// ── Task entry points ────────────────────────────────────────────────────────

#[tokio::test]
async fn task_runner_routes_both_payloads() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    seed(store.as_ref(), Some(2)).await;
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(2), PipelineConfig::default());
    let runner = TaskRunner::new(h.coordinator.clone());

    let page = assert_ok!(
        runner
            .run_json(&format!(
                r#"{{"task":"convert-page","documentVersionId":"ver_2","pageNumber":1,"url":"{SOURCE_URL}","teamId":"team_1"}}"#
            ))
            .await
    );
    let TaskOutput::Page { document_page_id } = page else {
        panic!("expected a page output, got {page:?}");
    };

    let doc = assert_ok!(
        runner
            .run_json(r#"{"task":"convert-pdf-to-images","documentVersionId":"ver_2"}"#)
            .await
    );
    assert_eq!(
        doc,
        TaskOutput::Document {
            success: true,
            message: "Successfully converted PDF to images".into()
        }
    );

    let first = h.store.find_page("ver_2", 1).await.unwrap().unwrap();
    assert_eq!(first.id, document_page_id);
}

#[tokio::test]
async fn task_runner_reports_unknown_version() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let h = harness(store, ScriptedHttp::ok(), FakeRenderer::new(1), PipelineConfig::default());
    let runner = TaskRunner::new(h.coordinator.clone());

    let err = assert_err!(
        runner
            .run_json(r#"{"task":"convert-pdf-to-images","documentVersionId":"ver_missing"}"#)
            .await
    );
    assert!(err.to_string().contains("ver_missing"));
}
