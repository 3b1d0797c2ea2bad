//! # mdbatch
//!
//! Batch job orchestration and status tracking for PDF-to-Markdown OCR
//! pipelines.
//!
//! ## Why this crate?
//!
//! Running a vision model over a long document page by page is slow and
//! fallible: one bad page should not lose fifty good ones, and a client
//! needs to see progress while pages grind through the backend. This crate
//! owns the orchestration half of that problem. It splits a document into
//! fixed-size page batches, dispatches each batch as an independent
//! asynchronous job on a bounded worker pool, tracks every job through a
//! validated status state machine, answers polling reads with cheap
//! snapshots, and recombines completed batches into one artifact, in page
//! order, only when everything succeeded.
//!
//! What it deliberately does *not* do: rasterise PDF pages or call an OCR
//! model. Both are injected as collaborator traits ([`PageRenderer`],
//! [`OcrEngine`]) so the engine stays free of any model SDK or rasteriser
//! dependency.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload(file, batch_size)
//!  │
//!  ├─ 1. Split     partition [1, total_pages] into batches (pure)
//!  ├─ 2. Register  Document + fixed batch plan in the registry
//!  │
//! process_batch(doc_id, index, model)          ── per batch, on demand ──
//!  │
//!  ├─ 3. Dispatch  claim batch, create job, return job_id immediately
//!  ├─ 4. Work      permit → render page → OCR (retry/backoff/timeout)
//!  │               → publish progress, strictly ascending pages
//!  ├─ 5. Finish    artifact stored atomically, batch/job terminal
//!  │
//! watch(job_id)                                 ── client side ──
//!  │
//!  ├─ 6. Poll      fixed interval until first terminal status, stop once
//!  └─ 7. Reconcile all batches completed? → document-completion event
//!
//! download_all(doc_id)   concatenate batch artifacts in index order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mdbatch::{Workbench, WorkbenchConfig};
//! # use std::path::Path;
//! # use async_trait::async_trait;
//! # use mdbatch::{OcrEngine, OcrError, PageImage, PageRenderer};
//! # struct PdfRenderer;
//! # #[async_trait]
//! # impl PageRenderer for PdfRenderer {
//! #     async fn page_count(&self, _p: &Path) -> Result<usize, OcrError> { Ok(25) }
//! #     async fn render_page(&self, _p: &Path, page: usize) -> Result<PageImage, OcrError> {
//! #         Ok(PageImage { page, bytes: vec![] })
//! #     }
//! # }
//! # struct VisionOcr;
//! # #[async_trait]
//! # impl OcrEngine for VisionOcr {
//! #     async fn ocr_page(&self, _i: &PageImage, _m: &str) -> Result<String, OcrError> {
//! #         Ok("# Page\n".into())
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workbench = Workbench::new(
//!         WorkbenchConfig::builder().max_concurrent_jobs(2).build()?,
//!         Arc::new(PdfRenderer),
//!         Arc::new(VisionOcr),
//!     )
//!     .await?;
//!
//!     let pdf = std::fs::read("document.pdf")?;
//!     let doc = workbench.upload("document.pdf", &pdf, 10).await?;
//!
//!     // Fire off every batch; the pool bounds actual concurrency.
//!     for batch in &doc.batches {
//!         let job_id = workbench.process_batch(&doc.doc_id, batch.index, None).await?;
//!         let job = workbench.await_job(&job_id).await?;
//!         println!("batch {}: {}", batch.index, job.status);
//!     }
//!
//!     let markdown = workbench.download_all(&doc.doc_id).await?;
//!     println!("{markdown}");
//!     Ok(())
//! }
//! ```
//!
//! ## Status state machines
//!
//! | Record | States | Terminal |
//! |--------|--------|----------|
//! | Batch  | `pending → processing → {completed, error}`, `error → processing` on re-dispatch | `completed`, `error` |
//! | Job    | `pending → processing → {complete, error}` | `complete`, `error` |
//!
//! Transitions are validated at the store boundary; a late write from a
//! finished task can never move a record backwards.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
mod dispatch;
pub mod document;
pub mod error;
pub mod events;
pub mod job;
pub mod ocr;
pub mod poll;
pub mod postprocess;
pub mod split;
pub mod workbench;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::ArtifactStore;
pub use config::{WorkbenchConfig, WorkbenchConfigBuilder};
pub use document::{Batch, BatchStatus, Document, DocumentRegistry};
pub use error::{UpstreamError, WorkbenchError};
pub use events::{EventsHandle, JobEvents, NoopJobEvents};
pub use job::{JobState, JobStatus, JobStore};
pub use ocr::{OcrEngine, OcrError, PageImage, PageRenderer};
pub use poll::{await_terminal, StatusPoller};
pub use split::{split_into_batches, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
pub use workbench::Workbench;
