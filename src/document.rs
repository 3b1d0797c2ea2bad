//! Documents, their batch plans, and the process-scoped document registry.
//!
//! A [`Document`] is created once at upload time: the splitter fixes its
//! batch plan and the plan never changes afterwards. Batch *status* fields
//! do change, but only through the registry's mutating methods, which
//! validate every transition against the closed [`BatchStatus`] state
//! machine. Callers never hold live references into the registry; every
//! read returns a cloned snapshot.
//!
//! ## Single writer per batch
//!
//! Each batch's status/job/result fields are owned by at most one dispatch
//! task at a time (the dispatch policy in
//! [`DocumentRegistry::begin_batch`] guarantees it). Two tasks working on
//! *different* batches of the same document therefore never race on the
//! same fields, and the registry lock is held only for the duration of a
//! single field update.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::WorkbenchError;

/// Lifecycle of a batch, from creation to a terminal state.
///
/// Transitions only move forward within one dispatch:
/// `pending → processing → {completed, error}`. The single backward edge,
/// `error → processing`, exists for explicit caller re-dispatch and is
/// only reachable through [`DocumentRegistry::begin_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created by the splitter, never dispatched (or not yet re-dispatched).
    Pending,
    /// A live job owns this batch.
    Processing,
    /// The owning job finished every page and stored a result artifact.
    Completed,
    /// The owning job failed; the batch is restartable.
    Error,
}

impl BatchStatus {
    /// Terminal states accept no further transitions within one dispatch.
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Error)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Error)
                | (Error, Processing)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous page-range subdivision of a document, processed as a
/// single unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Position in the document's batch list; also the aggregation order key.
    pub index: usize,
    /// First page of the range, 1-based inclusive.
    pub start: usize,
    /// Last page of the range, 1-based inclusive; `start <= end`.
    pub end: usize,
    pub status: BatchStatus,
    /// Identifier of the most recent job dispatched for this batch.
    pub job_id: Option<String>,
    /// Artifact filename, set only when `status` is `completed`.
    pub result_file: Option<String>,
}

impl Batch {
    pub fn new(index: usize, start: usize, end: usize) -> Self {
        Self {
            index,
            start,
            end,
            status: BatchStatus::Pending,
            job_id: None,
            result_file: None,
        }
    }

    /// Number of pages in this batch's range.
    pub fn page_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// An uploaded document and its fixed batch plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub filename: String,
    /// Spooled copy of the uploaded PDF; the dispatcher renders pages from it.
    pub pdf_path: PathBuf,
    pub total_pages: usize,
    pub batch_size: usize,
    /// Invariant: partitions `[1, total_pages]` exactly, ascending by index
    /// and by start page, no gaps or overlaps.
    pub batches: Vec<Batch>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn batch(&self, index: usize) -> Option<&Batch> {
        self.batches.get(index)
    }

    /// True when every batch in the plan reached `completed`.
    pub fn all_completed(&self) -> bool {
        self.batches
            .iter()
            .all(|b| b.status == BatchStatus::Completed)
    }

    /// Count of batches currently in the given status.
    pub fn count_with_status(&self, status: BatchStatus) -> usize {
        self.batches.iter().filter(|b| b.status == status).count()
    }
}

/// Process-wide store of documents, keyed by `doc_id`.
///
/// Cheap to clone; all clones share the same underlying map. Constructed
/// explicitly by the [`crate::workbench::Workbench`] rather than living in
/// a global, so tests can run any number of independent registries.
#[derive(Clone, Default)]
pub struct DocumentRegistry {
    docs: Arc<RwLock<HashMap<String, Document>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, doc: Document) {
        self.docs.write().await.insert(doc.doc_id.clone(), doc);
    }

    /// Snapshot of one document.
    pub async fn get(&self, doc_id: &str) -> Result<Document, WorkbenchError> {
        self.docs
            .read()
            .await
            .get(doc_id)
            .cloned()
            .ok_or_else(|| WorkbenchError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            })
    }

    /// Snapshot of the full registry, oldest upload first.
    pub async fn list(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self.docs.read().await.values().cloned().collect();
        docs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        docs
    }

    /// True when every batch of the document is `completed`.
    pub async fn all_completed(&self, doc_id: &str) -> Result<bool, WorkbenchError> {
        Ok(self.get(doc_id).await?.all_completed())
    }

    /// Claim a batch for a new dispatch.
    ///
    /// Accepted only for `pending` and `error` batches; a `processing` or
    /// `completed` batch returns [`WorkbenchError::BatchNotRestartable`].
    /// On success the batch moves to `processing`, records `job_id`, and
    /// drops any stale `result_file` from a previous attempt. Returns a
    /// snapshot of the claimed batch.
    pub(crate) async fn begin_batch(
        &self,
        doc_id: &str,
        index: usize,
        job_id: &str,
    ) -> Result<Batch, WorkbenchError> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(doc_id)
            .ok_or_else(|| WorkbenchError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            })?;
        let len = doc.batches.len();
        let batch = doc
            .batches
            .get_mut(index)
            .ok_or_else(|| WorkbenchError::BatchOutOfRange {
                doc_id: doc_id.to_string(),
                index,
                len,
            })?;

        if !batch.status.can_transition_to(BatchStatus::Processing) {
            return Err(WorkbenchError::BatchNotRestartable {
                index,
                status: batch.status,
            });
        }

        batch.status = BatchStatus::Processing;
        batch.job_id = Some(job_id.to_string());
        batch.result_file = None;
        Ok(batch.clone())
    }

    /// Record a finished batch: `processing → completed` plus the artifact.
    pub(crate) async fn complete_batch(
        &self,
        doc_id: &str,
        index: usize,
        result_file: &str,
    ) -> Result<(), WorkbenchError> {
        self.transition(doc_id, index, BatchStatus::Completed, Some(result_file))
            .await
    }

    /// Record a failed batch: `processing → error`.
    pub(crate) async fn fail_batch(&self, doc_id: &str, index: usize) -> Result<(), WorkbenchError> {
        self.transition(doc_id, index, BatchStatus::Error, None).await
    }

    async fn transition(
        &self,
        doc_id: &str,
        index: usize,
        next: BatchStatus,
        result_file: Option<&str>,
    ) -> Result<(), WorkbenchError> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(doc_id)
            .ok_or_else(|| WorkbenchError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            })?;
        let len = doc.batches.len();
        let batch = doc
            .batches
            .get_mut(index)
            .ok_or_else(|| WorkbenchError::BatchOutOfRange {
                doc_id: doc_id.to_string(),
                index,
                len,
            })?;

        if !batch.status.can_transition_to(next) {
            return Err(WorkbenchError::Internal(format!(
                "illegal batch transition {} -> {} on batch {index} of '{doc_id}'",
                batch.status, next
            )));
        }

        batch.status = next;
        if let Some(file) = result_file {
            batch.result_file = Some(file.to_string());
        }
        Ok(())
    }
}
