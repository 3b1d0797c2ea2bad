//! End-to-end tests for the batch workbench.
//!
//! These drive the full engine (upload → dispatch → poll → aggregate)
//! against scripted in-memory collaborators, so they run fast and need no
//! network, no model, and no real PDF rasteriser.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mdbatch::{
    BatchStatus, JobEvents, JobStatus, OcrEngine, OcrError, PageImage, PageRenderer, Workbench,
    WorkbenchConfig, WorkbenchError,
};
use tokio::time::{sleep, Duration};

// ── Scripted collaborators ───────────────────────────────────────────────────

/// Pretends every spooled upload has a fixed page count.
struct FixedRenderer {
    pages: usize,
}

#[async_trait]
impl PageRenderer for FixedRenderer {
    async fn page_count(&self, _pdf_path: &Path) -> Result<usize, OcrError> {
        Ok(self.pages)
    }

    async fn render_page(&self, _pdf_path: &Path, page: usize) -> Result<PageImage, OcrError> {
        if page == 0 || page > self.pages {
            return Err(OcrError::PageOutOfRange { page });
        }
        Ok(PageImage { page, bytes: vec![] })
    }
}

/// OCR engine with a per-test script: optional per-call delay, an optional
/// failing page with a limited failure budget, and live-concurrency
/// tracking for the worker-pool test.
struct ScriptedOcr {
    delay: Duration,
    fail_page: Option<usize>,
    /// Remaining failures for `fail_page`; `usize::MAX` fails forever.
    fail_budget: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

impl ScriptedOcr {
    fn ok() -> Arc<Self> {
        Self::new(Duration::ZERO, None, 0)
    }

    fn failing_forever(page: usize) -> Arc<Self> {
        Self::new(Duration::ZERO, Some(page), usize::MAX)
    }

    fn failing_once(page: usize) -> Arc<Self> {
        Self::new(Duration::ZERO, Some(page), 1)
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Self::new(delay, None, 0)
    }

    fn new(delay: Duration, fail_page: Option<usize>, budget: usize) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_page,
            fail_budget: AtomicUsize::new(budget),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
        })
    }

    fn max_concurrent_calls(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    async fn ocr_page(&self, image: &PageImage, _model: &str) -> Result<String, OcrError> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.live.fetch_sub(1, Ordering::SeqCst);

        if self.fail_page == Some(image.page) {
            let budget = self.fail_budget.load(Ordering::SeqCst);
            if budget > 0 {
                if budget != usize::MAX {
                    self.fail_budget.fetch_sub(1, Ordering::SeqCst);
                }
                return Err(OcrError::Upstream(format!(
                    "model refused page {}",
                    image.page
                )));
            }
        }
        Ok(format!("Text of page {}.", image.page))
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

const PDF: &[u8] = b"%PDF-1.4 test fixture";

/// Opt-in log output: `RUST_LOG=mdbatch=debug cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fast_config(dir: &Path, pool: usize) -> WorkbenchConfig {
    WorkbenchConfig::builder()
        .artifact_dir(dir)
        .max_concurrent_jobs(pool)
        .max_retries(0)
        .retry_backoff_ms(1)
        .ocr_timeout_secs(5)
        .poll_interval_ms(10)
        .build()
        .expect("valid test config")
}

async fn workbench(pages: usize, engine: Arc<ScriptedOcr>, pool: usize) -> (tempfile::TempDir, Workbench) {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = fast_config(dir.path(), pool);
    let wb = Workbench::new(config, Arc::new(FixedRenderer { pages }), engine)
        .await
        .expect("workbench must build");
    (dir, wb)
}

// ── Upload and splitting ─────────────────────────────────────────────────────

#[tokio::test]
async fn upload_creates_expected_batch_plan() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;

    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();
    assert_eq!(doc.total_pages, 25);
    assert_eq!(doc.batch_size, 10);

    let ranges: Vec<(usize, usize, usize)> = doc
        .batches
        .iter()
        .map(|b| (b.index, b.start, b.end))
        .collect();
    assert_eq!(ranges, vec![(0, 1, 10), (1, 11, 20), (2, 21, 25)]);
    assert!(doc.batches.iter().all(|b| b.status == BatchStatus::Pending));
    assert!(doc.batches.iter().all(|b| b.job_id.is_none()));

    let listed = wb.list_documents().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].doc_id, doc.doc_id);
}

#[tokio::test]
async fn upload_rejects_out_of_range_batch_size() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;

    for bad in [0, 21] {
        let err = wb.upload("report.pdf", PDF, bad).await.unwrap_err();
        assert!(
            matches!(err, WorkbenchError::InvalidBatchSize { got, .. } if got == bad),
            "batch size {bad} must be rejected"
        );
    }

    // Rejected before any state was created.
    assert!(wb.list_documents().await.is_empty());
}

#[tokio::test]
async fn upload_rejects_non_pdf_input() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;

    let err = wb.upload("notes.txt", b"hello", 5).await.unwrap_err();
    assert!(matches!(err, WorkbenchError::NotAPdf { .. }));
    assert!(wb.list_documents().await.is_empty());
}

#[tokio::test]
async fn identical_filenames_get_independent_documents() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;

    let first = wb.upload("report.pdf", PDF, 10).await.unwrap();
    let second = wb.upload("report.pdf", PDF, 10).await.unwrap();
    assert_ne!(first.doc_id, second.doc_id);

    // Completing a batch of one document leaves the other untouched.
    let job_id = wb.process_batch(&first.doc_id, 0, None).await.unwrap();
    let job = wb.await_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);

    let second_snapshot = wb.document(&second.doc_id).await.unwrap();
    assert!(second_snapshot
        .batches
        .iter()
        .all(|b| b.status == BatchStatus::Pending));
}

// ── Dispatch and job lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn batch_runs_to_completion() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;
    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();

    let job_id = wb.process_batch(&doc.doc_id, 0, None).await.unwrap();
    let job = wb.await_job(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.current_page, 10);
    assert_eq!(job.total_pages, 10);
    let result = job.result_filename.expect("result filename on complete");

    let snapshot = wb.document(&doc.doc_id).await.unwrap();
    assert_eq!(snapshot.batches[0].status, BatchStatus::Completed);
    assert_eq!(snapshot.batches[0].result_file.as_deref(), Some(result.as_str()));
    assert_eq!(snapshot.batches[0].job_id.as_deref(), Some(job_id.as_str()));

    let artifact = wb.read_artifact(&result).await.unwrap();
    assert!(artifact.contains("Text of page 1."));
    assert!(artifact.contains("Text of page 10."));
    assert!(!artifact.contains("Text of page 11."));
}

#[tokio::test]
async fn failed_page_marks_batch_error_and_leaves_siblings_alone() {
    let (_dir, wb) = workbench(25, ScriptedOcr::failing_forever(15), 4).await;
    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();

    let job_id = wb.process_batch(&doc.doc_id, 1, None).await.unwrap();
    let job = wb.await_job(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.message.contains("Page 15"), "got: {}", job.message);
    assert!(job.result_filename.is_none());

    let snapshot = wb.document(&doc.doc_id).await.unwrap();
    assert_eq!(snapshot.batches[1].status, BatchStatus::Error);
    assert_eq!(snapshot.batches[0].status, BatchStatus::Pending);
    assert_eq!(snapshot.batches[2].status, BatchStatus::Pending);
}

#[tokio::test]
async fn dispatch_rejected_while_processing_and_after_completion() {
    let (_dir, wb) = workbench(6, ScriptedOcr::slow(Duration::from_millis(40)), 4).await;
    let doc = wb.upload("report.pdf", PDF, 3).await.unwrap();

    let job_id = wb.process_batch(&doc.doc_id, 0, None).await.unwrap();

    // The batch is claimed synchronously at dispatch time.
    let err = wb.process_batch(&doc.doc_id, 0, None).await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::BatchNotRestartable {
            index: 0,
            status: BatchStatus::Processing,
        }
    ));

    let job = wb.await_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);

    let err = wb.process_batch(&doc.doc_id, 0, None).await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::BatchNotRestartable {
            index: 0,
            status: BatchStatus::Completed,
        }
    ));
}

#[tokio::test]
async fn dispatch_unknown_document_and_batch() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;

    let err = wb.process_batch("doc_missing", 0, None).await.unwrap_err();
    assert!(matches!(err, WorkbenchError::DocumentNotFound { .. }));

    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();
    let err = wb.process_batch(&doc.doc_id, 9, None).await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::BatchOutOfRange { index: 9, len: 3, .. }
    ));
}

#[tokio::test]
async fn unknown_job_status_lookup_fails() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;
    assert!(matches!(
        wb.job_status("job_missing").await.unwrap_err(),
        WorkbenchError::JobNotFound { .. }
    ));
}

// ── Aggregation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn download_all_rejects_partial_results() {
    let (_dir, wb) = workbench(25, ScriptedOcr::failing_forever(15), 4).await;
    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();

    // Nothing dispatched yet: all batches pending.
    let err = wb.download_all(&doc.doc_id).await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::PartialResults { completed: 0, total: 3 }
    ));

    // Batch 0 completes, batch 1 errors.
    let ok_job = wb.process_batch(&doc.doc_id, 0, None).await.unwrap();
    let bad_job = wb.process_batch(&doc.doc_id, 1, None).await.unwrap();
    assert_eq!(wb.await_job(&ok_job).await.unwrap().status, JobStatus::Complete);
    assert_eq!(wb.await_job(&bad_job).await.unwrap().status, JobStatus::Error);

    let err = wb.download_all(&doc.doc_id).await.unwrap_err();
    assert!(matches!(
        err,
        WorkbenchError::PartialResults { completed: 1, total: 3 }
    ));
}

#[tokio::test]
async fn redispatch_after_error_then_download_all_in_batch_order() {
    // Page 15 fails exactly once: the first dispatch of batch 1 errors,
    // the re-dispatch succeeds.
    let (_dir, wb) = workbench(25, ScriptedOcr::failing_once(15), 4).await;
    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();

    let bad_job = wb.process_batch(&doc.doc_id, 1, None).await.unwrap();
    assert_eq!(wb.await_job(&bad_job).await.unwrap().status, JobStatus::Error);

    // Dispatch the rest out of index order; aggregation order must not care.
    let job2 = wb.process_batch(&doc.doc_id, 2, None).await.unwrap();
    let job0 = wb.process_batch(&doc.doc_id, 0, None).await.unwrap();
    let retry = wb.process_batch(&doc.doc_id, 1, None).await.unwrap();
    for job_id in [&job2, &job0, &retry] {
        assert_eq!(wb.await_job(job_id).await.unwrap().status, JobStatus::Complete);
    }

    let combined = wb.download_all(&doc.doc_id).await.unwrap();
    let p1 = combined.find("# Pages 1-10").expect("batch 0 section");
    let p2 = combined.find("# Pages 11-20").expect("batch 1 section");
    let p3 = combined.find("# Pages 21-25").expect("batch 2 section");
    assert!(p1 < p2 && p2 < p3, "sections out of order:\n{combined}");
    assert!(combined.contains("\n\n---\n\n"));
    assert!(combined.contains("Text of page 15."));
    assert!(combined.ends_with('\n'));
}

// ── Polling ──────────────────────────────────────────────────────────────────

struct RecordingEvents {
    doc_completes: Arc<AtomicUsize>,
}

impl JobEvents for RecordingEvents {
    fn on_document_complete(&self, _doc_id: String) {
        self.doc_completes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn poller_stops_once_and_signals_document_completion() {
    let dir = tempfile::tempdir().unwrap();
    let doc_completes = Arc::new(AtomicUsize::new(0));
    let config = WorkbenchConfig::builder()
        .artifact_dir(dir.path())
        .max_retries(0)
        .poll_interval_ms(10)
        .events(Arc::new(RecordingEvents {
            doc_completes: Arc::clone(&doc_completes),
        }))
        .build()
        .unwrap();
    let wb = Workbench::new(config, Arc::new(FixedRenderer { pages: 10 }), ScriptedOcr::ok())
        .await
        .unwrap();

    // Single-batch document: one completed job completes the document.
    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();
    let job_id = wb.process_batch(&doc.doc_id, 0, None).await.unwrap();

    let poller = wb.watch(&job_id);
    poller.join().await;

    assert_eq!(doc_completes.load(Ordering::SeqCst), 1);

    // Each poller reconciles at most once. A second poller on the
    // already-terminal job observes, signals once, and stops.
    let second = wb.watch(&job_id);
    second.join().await;
    assert_eq!(doc_completes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stopping_a_poller_does_not_cancel_the_job() {
    let (_dir, wb) = workbench(3, ScriptedOcr::slow(Duration::from_millis(30)), 4).await;
    let doc = wb.upload("report.pdf", PDF, 3).await.unwrap();
    let job_id = wb.process_batch(&doc.doc_id, 0, None).await.unwrap();

    let poller = wb.watch(&job_id);
    poller.stop();
    assert!(poller.is_stopped());
    // Stopping twice is a no-op.
    poller.stop();
    poller.join().await;

    // Observation stopped; the job still runs to completion.
    let job = wb.await_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    let snapshot = wb.document(&doc.doc_id).await.unwrap();
    assert_eq!(snapshot.batches[0].status, BatchStatus::Completed);
}

#[tokio::test]
async fn poller_for_unknown_job_stops_itself() {
    let (_dir, wb) = workbench(3, ScriptedOcr::ok(), 4).await;
    let poller = wb.watch("job_missing");
    poller.join().await;
}

// ── Concurrency model ────────────────────────────────────────────────────────

#[tokio::test]
async fn worker_pool_bounds_concurrent_jobs() {
    let engine = ScriptedOcr::slow(Duration::from_millis(20));
    let (_dir, wb) = workbench(4, Arc::clone(&engine), 1).await;
    let doc = wb.upload("report.pdf", PDF, 1).await.unwrap();
    assert_eq!(doc.batches.len(), 4);

    // Dispatch everything at once; the pool admits one job at a time.
    let mut job_ids = Vec::new();
    for batch in &doc.batches {
        job_ids.push(wb.process_batch(&doc.doc_id, batch.index, None).await.unwrap());
    }
    for job_id in &job_ids {
        assert_eq!(wb.await_job(job_id).await.unwrap().status, JobStatus::Complete);
    }

    assert_eq!(engine.max_concurrent_calls(), 1);
    assert!(wb.download_all(&doc.doc_id).await.is_ok());
}

#[tokio::test]
async fn concurrent_batches_of_one_document_do_not_interfere() {
    let engine = ScriptedOcr::slow(Duration::from_millis(5));
    let (_dir, wb) = workbench(20, Arc::clone(&engine), 4).await;
    let doc = wb.upload("report.pdf", PDF, 5).await.unwrap();

    let mut job_ids = Vec::new();
    for batch in &doc.batches {
        job_ids.push(wb.process_batch(&doc.doc_id, batch.index, None).await.unwrap());
    }
    for job_id in &job_ids {
        assert_eq!(wb.await_job(job_id).await.unwrap().status, JobStatus::Complete);
    }

    let combined = wb.download_all(&doc.doc_id).await.unwrap();
    for page in 1..=20 {
        assert!(
            combined.contains(&format!("Text of page {page}.")),
            "page {page} missing from combined output"
        );
    }
}

// ── Whole-document variant ───────────────────────────────────────────────────

#[tokio::test]
async fn whole_document_job_spans_every_page() {
    let (_dir, wb) = workbench(25, ScriptedOcr::ok(), 4).await;
    let doc = wb.upload("report.pdf", PDF, 10).await.unwrap();

    let job_id = wb.process_document(&doc.doc_id, Some("gpt-5-mini")).await.unwrap();
    let job = wb.await_job(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.total_pages, 25);
    assert_eq!(job.current_page, 25);
    assert!(job.batch_index.is_none());

    let result = job.result_filename.expect("whole-document result");
    let artifact = wb.read_artifact(&result).await.unwrap();
    assert!(artifact.contains("Text of page 1."));
    assert!(artifact.contains("Text of page 25."));

    // The batch plan is untouched by the whole-document variant.
    let snapshot = wb.document(&doc.doc_id).await.unwrap();
    assert!(snapshot.batches.iter().all(|b| b.status == BatchStatus::Pending));
}

// ── Shutdown ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_fails_in_flight_jobs_between_pages() {
    let (_dir, wb) = workbench(5, ScriptedOcr::slow(Duration::from_millis(40)), 4).await;
    let doc = wb.upload("report.pdf", PDF, 5).await.unwrap();
    let job_id = wb.process_batch(&doc.doc_id, 0, None).await.unwrap();

    // Let the first page start, then pull the plug.
    sleep(Duration::from_millis(50)).await;
    wb.shutdown();

    let job = wb.await_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.message.contains("cancelled"), "got: {}", job.message);

    let snapshot = wb.document(&doc.doc_id).await.unwrap();
    assert_eq!(snapshot.batches[0].status, BatchStatus::Error);
}
