//! The workbench facade: upload, dispatch, status, and aggregation.
//!
//! One [`Workbench`] owns the document registry, the job store, the
//! artifact store, and the dispatcher's worker pool, and exposes the
//! transport-agnostic operations a host application maps onto its own
//! surface (HTTP handlers, a CLI, a desktop shell). Construction is
//! explicit: nothing lives in a global, and independent workbenches
//! (one per test, for instance) never share state.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::config::WorkbenchConfig;
use crate::dispatch::Dispatcher;
use crate::document::{Document, DocumentRegistry};
use crate::error::WorkbenchError;
use crate::events::{EventsHandle, NoopJobEvents};
use crate::job::{JobState, JobStore};
use crate::ocr::{OcrEngine, PageRenderer};
use crate::poll::{self, StatusPoller};
use crate::split::{split_into_batches, MAX_BATCH_SIZE, MIN_BATCH_SIZE};

/// Allocate a process-unique document identifier.
fn new_doc_id() -> String {
    format!("doc_{}", Uuid::new_v4().simple())
}

/// Batch OCR workbench: the single entry point of this crate.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use mdbatch::{Workbench, WorkbenchConfig};
/// # use std::path::Path;
/// # use async_trait::async_trait;
/// # use mdbatch::{OcrEngine, OcrError, PageImage, PageRenderer};
/// # struct MyRenderer;
/// # #[async_trait]
/// # impl PageRenderer for MyRenderer {
/// #     async fn page_count(&self, _p: &Path) -> Result<usize, OcrError> { Ok(1) }
/// #     async fn render_page(&self, _p: &Path, page: usize) -> Result<PageImage, OcrError> {
/// #         Ok(PageImage { page, bytes: vec![] })
/// #     }
/// # }
/// # struct MyEngine;
/// # #[async_trait]
/// # impl OcrEngine for MyEngine {
/// #     async fn ocr_page(&self, _i: &PageImage, _m: &str) -> Result<String, OcrError> {
/// #         Ok(String::new())
/// #     }
/// # }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let workbench = Workbench::new(
///     WorkbenchConfig::default(),
///     Arc::new(MyRenderer),
///     Arc::new(MyEngine),
/// )
/// .await?;
///
/// let pdf = std::fs::read("document.pdf")?;
/// let doc = workbench.upload("document.pdf", &pdf, 10).await?;
/// for batch in &doc.batches {
///     workbench.process_batch(&doc.doc_id, batch.index, None).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Workbench {
    config: WorkbenchConfig,
    registry: DocumentRegistry,
    jobs: JobStore,
    artifacts: ArtifactStore,
    dispatcher: Dispatcher,
    renderer: Arc<dyn PageRenderer>,
    events: EventsHandle,
    shutdown: CancellationToken,
}

impl Workbench {
    /// Build a workbench around the two injected collaborators.
    ///
    /// Creates the artifact directory if it does not exist.
    pub async fn new(
        config: WorkbenchConfig,
        renderer: Arc<dyn PageRenderer>,
        engine: Arc<dyn OcrEngine>,
    ) -> Result<Self, WorkbenchError> {
        let artifacts = ArtifactStore::open(&config.artifact_dir).await?;
        let registry = DocumentRegistry::new();
        let jobs = JobStore::new();
        let events: EventsHandle = config
            .events
            .clone()
            .unwrap_or_else(|| Arc::new(NoopJobEvents));
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher::new(
            registry.clone(),
            jobs.clone(),
            artifacts.clone(),
            Arc::clone(&renderer),
            engine,
            shutdown.clone(),
            Arc::clone(&events),
            config.clone(),
        );

        Ok(Self {
            config,
            registry,
            jobs,
            artifacts,
            dispatcher,
            renderer,
            events,
            shutdown,
        })
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    /// Shared handle to the job store. Reads only: the mutating methods
    /// are reserved for the dispatcher.
    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Shared handle to the document registry. Reads only, as above.
    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    // ── Upload ────────────────────────────────────────────────────────────

    /// Register an uploaded PDF and fix its batch plan.
    ///
    /// Validation happens before any state is created: a non-`.pdf`
    /// filename or an out-of-range batch size leaves the registry
    /// untouched. Two uploads of identically named files produce two
    /// distinct documents with independent batch state.
    pub async fn upload(
        &self,
        filename: &str,
        pdf: &[u8],
        batch_size: usize,
    ) -> Result<Document, WorkbenchError> {
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(WorkbenchError::NotAPdf {
                filename: filename.to_string(),
            });
        }
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(WorkbenchError::InvalidBatchSize {
                got: batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        let doc_id = new_doc_id();
        let pdf_path = self.artifacts.spool_upload(&doc_id, pdf).await?;

        let total_pages = match self.renderer.page_count(&pdf_path).await {
            Ok(n) => n,
            Err(e) => {
                self.artifacts.discard_upload(&pdf_path).await;
                return Err(WorkbenchError::UnreadablePdf {
                    filename: filename.to_string(),
                    detail: e.to_string(),
                });
            }
        };

        let batches = match split_into_batches(total_pages, batch_size) {
            Ok(batches) => batches,
            Err(e) => {
                self.artifacts.discard_upload(&pdf_path).await;
                return Err(e);
            }
        };

        let doc = Document {
            doc_id: doc_id.clone(),
            filename: filename.to_string(),
            pdf_path,
            total_pages,
            batch_size,
            batches,
            created_at: chrono::Utc::now(),
        };
        self.registry.insert(doc.clone()).await;

        info!(
            %doc_id,
            filename,
            total_pages,
            batch_size,
            batches = doc.batches.len(),
            "document uploaded"
        );
        Ok(doc)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    /// Dispatch one batch for processing. Returns the new `job_id`
    /// immediately; observe progress through [`job_status`](Self::job_status)
    /// or [`watch`](Self::watch).
    pub async fn process_batch(
        &self,
        doc_id: &str,
        batch_index: usize,
        model: Option<&str>,
    ) -> Result<String, WorkbenchError> {
        let model = model.unwrap_or(&self.config.default_model);
        self.dispatcher.dispatch_batch(doc_id, batch_index, model).await
    }

    /// Dispatch the entire document as a single job (the non-batched
    /// variant). The batch plan is unaffected; fetch the result through
    /// the job's `result_filename`.
    pub async fn process_document(
        &self,
        doc_id: &str,
        model: Option<&str>,
    ) -> Result<String, WorkbenchError> {
        let model = model.unwrap_or(&self.config.default_model);
        self.dispatcher.dispatch_document(doc_id, model).await
    }

    // ── Status ────────────────────────────────────────────────────────────

    /// Snapshot of one job's state.
    pub async fn job_status(&self, job_id: &str) -> Result<JobState, WorkbenchError> {
        self.jobs.get(job_id).await
    }

    /// Snapshot of one document, including current batch statuses.
    pub async fn document(&self, doc_id: &str) -> Result<Document, WorkbenchError> {
        self.registry.get(doc_id).await
    }

    /// Snapshot of every registered document, oldest upload first.
    pub async fn list_documents(&self) -> Vec<Document> {
        self.registry.list().await
    }

    /// Spawn a background poller for `job_id` at the configured interval.
    pub fn watch(&self, job_id: &str) -> StatusPoller {
        StatusPoller::spawn(
            self.jobs.clone(),
            self.registry.clone(),
            job_id.to_string(),
            Duration::from_millis(self.config.poll_interval_ms),
            Arc::clone(&self.events),
        )
    }

    /// Poll inline until `job_id` reaches a terminal status.
    pub async fn await_job(&self, job_id: &str) -> Result<JobState, WorkbenchError> {
        poll::await_terminal(
            &self.jobs,
            job_id,
            Duration::from_millis(self.config.poll_interval_ms),
        )
        .await
    }

    // ── Results ───────────────────────────────────────────────────────────

    /// Read one stored result artifact.
    pub async fn read_artifact(&self, filename: &str) -> Result<String, WorkbenchError> {
        self.artifacts.read(filename).await
    }

    /// Concatenate every completed batch of a document, ascending by batch
    /// index, into one markdown artifact.
    ///
    /// All-or-nothing: any batch still `pending`, `processing`, or
    /// `error` fails the whole call with
    /// [`WorkbenchError::PartialResults`].
    pub async fn download_all(&self, doc_id: &str) -> Result<String, WorkbenchError> {
        let doc = self.registry.get(doc_id).await?;

        let completed = doc.count_with_status(crate::document::BatchStatus::Completed);
        if completed != doc.batches.len() {
            return Err(WorkbenchError::PartialResults {
                completed,
                total: doc.batches.len(),
            });
        }

        // Reads run a few at a time; `buffered` keeps the output in batch
        // order no matter which read finishes first.
        let parts: Vec<String> = stream::iter(doc.batches.into_iter().map(|batch| {
            let artifacts = self.artifacts.clone();
            async move {
                let file = batch.result_file.as_deref().ok_or_else(|| {
                    WorkbenchError::Internal(format!(
                        "completed batch {} of '{doc_id}' has no result artifact",
                        batch.index
                    ))
                })?;
                let content = artifacts.read(file).await?;
                Ok::<String, WorkbenchError>(format!(
                    "# Pages {}-{}\n\n{}",
                    batch.start,
                    batch.end,
                    content.trim_end()
                ))
            }
        }))
        .buffered(4)
        .try_collect()
        .await?;

        Ok(parts.join("\n\n---\n\n") + "\n")
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Cancel every in-flight and queued job. Running jobs observe the
    /// token between pages and terminate with an error status; already
    /// terminal jobs and stored artifacts are untouched.
    pub fn shutdown(&self) {
        info!("workbench shutdown requested");
        self.shutdown.cancel();
    }
}
