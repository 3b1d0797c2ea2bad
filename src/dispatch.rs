//! Job dispatcher: fire-and-dispatch execution of batch and
//! whole-document jobs.
//!
//! `dispatch_*` validates, claims the batch, records a `pending` job, and
//! returns the new `job_id` immediately; the caller observes progress
//! through the [`crate::job::JobStore`], never through the return value.
//! The spawned task then:
//!
//! 1. waits for a worker-pool permit (a bounded [`Semaphore`], so a
//!    document whose every batch is dispatched at once cannot flood the
//!    OCR collaborator),
//! 2. walks the page range in strictly ascending order, rendering and
//!    OCR-ing one page at a time and publishing progress after each page,
//! 3. on success writes the batch artifact atomically and marks batch and
//!    job terminal; on the first failed page it marks both `error` and
//!    stops, leaving sibling batches untouched.
//!
//! The cancellation token is observed between pages and while queued.
//! Stopping a status poller never cancels anything here.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::config::WorkbenchConfig;
use crate::document::DocumentRegistry;
use crate::error::{UpstreamError, WorkbenchError};
use crate::events::EventsHandle;
use crate::job::{JobState, JobStore};
use crate::ocr::{ocr_page_with_retry, OcrEngine, PageRenderer};
use crate::postprocess::clean_ocr_output;

/// Allocate a process-unique job identifier.
fn new_job_id() -> String {
    format!("job_{}", Uuid::new_v4().simple())
}

/// Owns the worker pool and spawns one task per dispatched job.
pub(crate) struct Dispatcher {
    registry: DocumentRegistry,
    jobs: JobStore,
    artifacts: ArtifactStore,
    renderer: Arc<dyn PageRenderer>,
    engine: Arc<dyn OcrEngine>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    events: EventsHandle,
    config: WorkbenchConfig,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: DocumentRegistry,
        jobs: JobStore,
        artifacts: ArtifactStore,
        renderer: Arc<dyn PageRenderer>,
        engine: Arc<dyn OcrEngine>,
        shutdown: CancellationToken,
        events: EventsHandle,
        config: WorkbenchConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            registry,
            jobs,
            artifacts,
            renderer,
            engine,
            permits,
            shutdown,
            events,
            config,
        }
    }

    /// Dispatch one batch of a document. Returns the new `job_id` without
    /// waiting for the batch to finish.
    pub(crate) async fn dispatch_batch(
        &self,
        doc_id: &str,
        batch_index: usize,
        model: &str,
    ) -> Result<String, WorkbenchError> {
        let doc = self.registry.get(doc_id).await?;
        let job_id = new_job_id();

        // Claiming the batch is the dispatch-policy gate: only pending and
        // errored batches get past this line.
        let batch = self.registry.begin_batch(doc_id, batch_index, &job_id).await?;

        self.jobs
            .create(JobState::for_batch(&job_id, doc_id, &batch))
            .await;
        self.events
            .on_job_queued(job_id.clone(), batch.page_count());

        info!(
            %job_id,
            doc_id,
            batch = batch_index,
            start = batch.start,
            end = batch.end,
            model,
            "batch dispatched"
        );

        let task = JobTask {
            job_id: job_id.clone(),
            doc_id: doc_id.to_string(),
            batch_index: Some(batch_index),
            pdf_path: doc.pdf_path.clone(),
            start: batch.start,
            end: batch.end,
            model: model.to_string(),
            artifact_name: format!("batch_{doc_id}_{batch_index}.md"),
            complete_message: "Batch processing complete!".to_string(),
            fail_prefix: "Batch processing failed",
            registry: self.registry.clone(),
            jobs: self.jobs.clone(),
            artifacts: self.artifacts.clone(),
            renderer: Arc::clone(&self.renderer),
            engine: Arc::clone(&self.engine),
            permits: Arc::clone(&self.permits),
            cancel: self.shutdown.child_token(),
            events: Arc::clone(&self.events),
            config: self.config.clone(),
        };
        tokio::spawn(task.run());

        Ok(job_id)
    }

    /// Dispatch the whole document as one job spanning `[1, total_pages]`.
    ///
    /// The degenerate non-batched variant: the same job state machine and
    /// polling contract apply, with progress reported over the full
    /// document. The batch plan is not touched; the result is addressable
    /// only through the job's `result_filename`.
    pub(crate) async fn dispatch_document(
        &self,
        doc_id: &str,
        model: &str,
    ) -> Result<String, WorkbenchError> {
        let doc = self.registry.get(doc_id).await?;
        let job_id = new_job_id();

        self.jobs
            .create(JobState::for_document(&job_id, doc_id, doc.total_pages))
            .await;
        self.events.on_job_queued(job_id.clone(), doc.total_pages);

        info!(%job_id, doc_id, total_pages = doc.total_pages, model, "document dispatched");

        let task = JobTask {
            job_id: job_id.clone(),
            doc_id: doc_id.to_string(),
            batch_index: None,
            pdf_path: doc.pdf_path.clone(),
            start: 1,
            end: doc.total_pages,
            model: model.to_string(),
            artifact_name: format!("result_{job_id}.md"),
            complete_message: "Processing complete!".to_string(),
            fail_prefix: "OCR processing failed",
            registry: self.registry.clone(),
            jobs: self.jobs.clone(),
            artifacts: self.artifacts.clone(),
            renderer: Arc::clone(&self.renderer),
            engine: Arc::clone(&self.engine),
            permits: Arc::clone(&self.permits),
            cancel: self.shutdown.child_token(),
            events: Arc::clone(&self.events),
            config: self.config.clone(),
        };
        tokio::spawn(task.run());

        Ok(job_id)
    }
}

/// Everything one spawned job needs, moved into its task.
struct JobTask {
    job_id: String,
    doc_id: String,
    /// `None` for whole-document jobs.
    batch_index: Option<usize>,
    pdf_path: PathBuf,
    /// Page range, 1-based inclusive.
    start: usize,
    end: usize,
    model: String,
    artifact_name: String,
    complete_message: String,
    fail_prefix: &'static str,
    registry: DocumentRegistry,
    jobs: JobStore,
    artifacts: ArtifactStore,
    renderer: Arc<dyn PageRenderer>,
    engine: Arc<dyn OcrEngine>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    events: EventsHandle,
    config: WorkbenchConfig,
}

impl JobTask {
    async fn run(self) {
        // Queue for a worker-pool permit; shutdown unblocks queued jobs.
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            self.fail(UpstreamError::Cancelled { page: self.start }.to_string())
                .await;
            return;
        };

        self.jobs.start(&self.job_id).await;
        self.events.on_job_started(self.job_id.clone());

        let total_in_range = self.end - self.start + 1;
        let mut sections: Vec<String> = Vec::with_capacity(total_in_range);

        // Pages strictly ascending: progress must be monotonic and the
        // artifact concatenation deterministic.
        for page in self.start..=self.end {
            if self.cancel.is_cancelled() {
                self.fail(UpstreamError::Cancelled { page }.to_string()).await;
                return;
            }

            self.jobs
                .set_progress(
                    &self.job_id,
                    page,
                    format!("Processing page {page} of {}...", self.end),
                )
                .await;

            let image = match self.renderer.render_page(&self.pdf_path, page).await {
                Ok(image) => image,
                Err(e) => {
                    let err = UpstreamError::Render {
                        page,
                        detail: e.to_string(),
                    };
                    self.fail(err.to_string()).await;
                    return;
                }
            };

            match ocr_page_with_retry(&self.engine, &image, &self.model, &self.config).await {
                Ok(text) => sections.push(clean_ocr_output(&text)),
                Err(e) => {
                    self.fail(e.to_string()).await;
                    return;
                }
            }

            self.events
                .on_page_done(self.job_id.clone(), page, total_in_range);
        }

        let body = sections
            .iter()
            .map(|s| s.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
            + "\n";

        if let Err(e) = self.artifacts.write(&self.artifact_name, &body).await {
            self.fail(format!("Failed to store result artifact: {e}")).await;
            return;
        }

        if let Some(index) = self.batch_index {
            if let Err(e) = self
                .registry
                .complete_batch(&self.doc_id, index, &self.artifact_name)
                .await
            {
                warn!(job_id = %self.job_id, error = %e, "batch completion not recorded");
            }
        }

        self.jobs
            .complete(
                &self.job_id,
                self.end,
                &self.artifact_name,
                self.complete_message.clone(),
            )
            .await;
        self.events
            .on_job_complete(self.job_id.clone(), self.artifact_name.clone());

        info!(
            job_id = %self.job_id,
            doc_id = %self.doc_id,
            artifact = %self.artifact_name,
            pages = total_in_range,
            "job complete"
        );
    }

    /// Terminal failure: job `error`, owning batch `error`, then stop.
    async fn fail(&self, detail: String) {
        let message = format!("{}: {detail}", self.fail_prefix);
        error!(job_id = %self.job_id, doc_id = %self.doc_id, %message, "job failed");

        self.jobs.fail(&self.job_id, message.clone()).await;
        if let Some(index) = self.batch_index {
            if let Err(e) = self.registry.fail_batch(&self.doc_id, index).await {
                warn!(job_id = %self.job_id, error = %e, "batch failure not recorded");
            }
        }
        self.events.on_job_error(self.job_id.clone(), message);
    }
}
