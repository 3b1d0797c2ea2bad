//! Job state and the process-scoped job store.
//!
//! The [`JobStore`] is the sole authority for job state. A job's entry is
//! mutated only by its owning dispatch task (the mutating methods are
//! crate-private); any number of pollers read it concurrently through
//! cloned snapshots. Updates that would violate the status state machine
//! are dropped rather than applied, so a late write from a finished task
//! can never move a job backwards out of a terminal state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::document::Batch;
use crate::error::WorkbenchError;

/// Lifecycle of one dispatched job.
///
/// `pending` covers the window between dispatch and the job acquiring a
/// worker-pool permit. `pending → error` exists for jobs cancelled before
/// they ever start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    /// Terminal statuses stop pollers; no further transitions occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Complete) | (Processing, Error) | (Pending, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The asynchronous-execution record for one dispatch.
///
/// `current_page` and `message` advance monotonically while the job is
/// `processing`; a concurrent poller never observes progress moving
/// backwards. `total_pages` is the page count of this job's range (the
/// whole document for a whole-document job, the batch span otherwise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    /// Document this job belongs to.
    pub doc_id: String,
    /// Batch this job owns; `None` for whole-document jobs.
    pub batch_index: Option<usize>,
    pub status: JobStatus,
    /// Page currently (or last) worked on, 1-based; 0 before the first page.
    pub current_page: usize,
    pub total_pages: usize,
    /// Human-readable progress or error text.
    pub message: String,
    /// Result artifact filename, set only on `complete`.
    pub result_filename: Option<String>,
}

impl JobState {
    /// Fresh record for a batch dispatch.
    pub(crate) fn for_batch(job_id: &str, doc_id: &str, batch: &Batch) -> Self {
        Self {
            job_id: job_id.to_string(),
            doc_id: doc_id.to_string(),
            batch_index: Some(batch.index),
            status: JobStatus::Pending,
            current_page: 0,
            total_pages: batch.page_count(),
            message: "Starting batch processing...".to_string(),
            result_filename: None,
        }
    }

    /// Fresh record for a whole-document dispatch.
    pub(crate) fn for_document(job_id: &str, doc_id: &str, total_pages: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            doc_id: doc_id.to_string(),
            batch_index: None,
            status: JobStatus::Pending,
            current_page: 0,
            total_pages,
            message: "Starting processing...".to_string(),
            result_filename: None,
        }
    }
}

/// Process-wide map from job identifier to job state.
///
/// Cheap to clone; all clones share the same underlying map.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, JobState>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn create(&self, job: JobState) {
        self.jobs.write().await.insert(job.job_id.clone(), job);
    }

    /// Snapshot of one job.
    pub async fn get(&self, job_id: &str) -> Result<JobState, WorkbenchError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| WorkbenchError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Mark the job as actively processing (`pending → processing`).
    pub(crate) async fn start(&self, job_id: &str) {
        self.mutate(job_id, |job| {
            if job.status.can_transition_to(JobStatus::Processing) {
                job.status = JobStatus::Processing;
            }
        })
        .await;
    }

    /// Record per-page progress. Ignored once the job left `processing`.
    pub(crate) async fn set_progress(&self, job_id: &str, current_page: usize, message: String) {
        self.mutate(job_id, |job| {
            if job.status == JobStatus::Processing {
                job.current_page = current_page.max(job.current_page);
                job.message = message;
            }
        })
        .await;
    }

    /// Record success (`processing → complete`) with the result artifact.
    ///
    /// `final_page` is the last page of the job's range; `current_page`
    /// lands there regardless of how the per-page updates interleaved.
    pub(crate) async fn complete(
        &self,
        job_id: &str,
        final_page: usize,
        result_filename: &str,
        message: String,
    ) {
        self.mutate(job_id, |job| {
            if job.status.can_transition_to(JobStatus::Complete) {
                job.status = JobStatus::Complete;
                job.current_page = final_page.max(job.current_page);
                job.message = message;
                job.result_filename = Some(result_filename.to_string());
            }
        })
        .await;
    }

    /// Record failure with the terminal error message.
    pub(crate) async fn fail(&self, job_id: &str, message: String) {
        self.mutate(job_id, |job| {
            if job.status.can_transition_to(JobStatus::Error) {
                job.status = JobStatus::Error;
                job.message = message;
            }
        })
        .await;
    }

    async fn mutate(&self, job_id: &str, apply: impl FnOnce(&mut JobState)) {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(job) => apply(job),
            // Only the owning dispatch task calls the mutators, so a miss
            // means the store handle and the task disagree about creation
            // order. Log it instead of inventing an entry.
            None => warn!(job_id, "update for unknown job dropped"),
        }
    }
}
