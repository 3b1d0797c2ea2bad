//! Error types for the mdbatch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`WorkbenchError`], caller-facing: the requested operation cannot
//!   proceed at all (invalid batch size, unknown document, download-all
//!   before every batch finished). Returned as `Err(WorkbenchError)` from
//!   the [`crate::workbench::Workbench`] operations and rejected before any
//!   state is created.
//!
//! * [`UpstreamError`], job-scoped: a page inside one dispatched job
//!   failed (OCR collaborator error, stalled call, render glitch). It
//!   terminates only the owning job; sibling batches keep running. The
//!   message is recorded on the job and surfaced through the batch's
//!   `error` status, never propagated out of the dispatch task.
//!
//! No error in either tier is ever escalated to crash the process.

use crate::document::BatchStatus;
use std::path::PathBuf;
use thiserror::Error;

/// All caller-facing errors returned by the mdbatch library.
///
/// Page-level failures inside a running job use [`UpstreamError`] and are
/// recorded on the job rather than propagated here.
#[derive(Debug, Error)]
pub enum WorkbenchError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Requested batch size falls outside the accepted range.
    #[error("Batch size must be between {min} and {max} pages, got {got}")]
    InvalidBatchSize { got: usize, min: usize, max: usize },

    /// The document reports fewer than one page.
    #[error("Document must have at least one page, got {got}")]
    InvalidPageCount { got: usize },

    /// The uploaded file does not carry a `.pdf` extension.
    #[error("'{filename}' is not a PDF file\nOnly PDF uploads are accepted.")]
    NotAPdf { filename: String },

    /// The uploaded bytes could not be opened as a page source.
    #[error("Could not read pages of '{filename}': {detail}")]
    UnreadablePdf { filename: String, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Lookup errors ─────────────────────────────────────────────────────
    /// No document registered under the given identifier.
    #[error("Document not found: '{doc_id}'")]
    DocumentNotFound { doc_id: String },

    /// No job recorded under the given identifier.
    #[error("Job not found: '{job_id}'")]
    JobNotFound { job_id: String },

    /// Batch index exceeds the document's batch plan.
    #[error("Batch {index} is out of range (document '{doc_id}' has {len} batches)")]
    BatchOutOfRange {
        doc_id: String,
        index: usize,
        len: usize,
    },

    /// No result artifact stored under the given filename.
    #[error("Artifact not found: '{filename}'")]
    ArtifactNotFound { filename: String },

    /// Artifact filename contains path separators or traversal components.
    #[error("Invalid artifact name: '{filename}'")]
    InvalidArtifactName { filename: String },

    // ── Dispatch policy errors ────────────────────────────────────────────
    /// Dispatch was requested for a batch that is not in a restartable
    /// state. Only `pending` and `error` batches accept a dispatch;
    /// re-dispatching a `processing` or `completed` batch is a caller error.
    #[error("Batch {index} is {status} and cannot be dispatched\nOnly pending or errored batches accept a new dispatch.")]
    BatchNotRestartable { index: usize, status: BatchStatus },

    // ── Aggregation errors ────────────────────────────────────────────────
    /// Download-all was requested before every batch completed.
    #[error("Only {completed}/{total} batches are completed\nDispatch the remaining batches and wait for them to finish.")]
    PartialResults { completed: usize, total: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read or write a file under the artifact directory.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure that terminates a single dispatched job.
///
/// Produced while a job works through its page range and stored as the
/// job's error message. The `retries` count on [`UpstreamError::Api`]
/// reflects the attempts already spent inside the per-page retry loop;
/// there is no automatic job-level retry on top of it.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UpstreamError {
    /// The OCR collaborator failed on a page after all retries.
    #[error("Page {page}: OCR call failed after {retries} retries: {detail}")]
    Api {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The OCR call exceeded the per-call timeout.
    #[error("Page {page}: OCR call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The page could not be rendered to an image.
    #[error("Page {page}: rasterisation failed: {detail}")]
    Render { page: usize, detail: String },

    /// The job observed its cancellation token between pages.
    #[error("Job cancelled before page {page}")]
    Cancelled { page: usize },
}
