//! Client-driven status polling with stop-exactly-once semantics.
//!
//! A [`StatusPoller`] re-queries one job's state at a fixed interval until
//! it observes the first terminal status (`complete` or `error`), then
//! stops and runs a single reconciliation pass: take a fresh snapshot of
//! the job's document and, if every batch is now `completed`, fire the
//! document-completion event. Pollers for different jobs are fully
//! independent, each with its own timer and stop condition.
//!
//! Stopping a poller stops *observation only*. The underlying job keeps
//! running to completion or failure regardless; cancellation is a separate
//! concern owned by the workbench shutdown token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use crate::document::DocumentRegistry;
use crate::error::WorkbenchError;
use crate::events::EventsHandle;
use crate::job::{JobState, JobStore};

/// Handle to a background polling loop for one `job_id`.
pub struct StatusPoller {
    job_id: String,
    stopped: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    /// Spawn a polling loop for `job_id`.
    ///
    /// The `stopped` flag is flipped exactly once, either by the loop on
    /// its first terminal observation or by an explicit [`stop`](Self::stop)
    /// call, whichever comes first. Reconciliation runs only on the
    /// terminal path, never on an explicit stop.
    pub(crate) fn spawn(
        jobs: JobStore,
        registry: DocumentRegistry,
        job_id: String,
        poll_interval: Duration,
        events: EventsHandle,
    ) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(poll_loop(
            jobs,
            registry,
            job_id.clone(),
            poll_interval,
            events,
            Arc::clone(&stopped),
        ));
        Self {
            job_id,
            stopped,
            handle,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Whether this poller already stopped (terminal status seen, job
    /// lookup failed, or an explicit `stop`).
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop observing. Idempotent: a poller that already stopped is not
    /// touched again, and the running job is unaffected either way.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.handle.abort();
        }
    }

    /// Wait for the polling loop to finish.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn poll_loop(
    jobs: JobStore,
    registry: DocumentRegistry,
    job_id: String,
    poll_interval: Duration,
    events: EventsHandle,
    stopped: Arc<AtomicBool>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if stopped.load(Ordering::SeqCst) {
            return;
        }

        let job = match jobs.get(&job_id).await {
            Ok(job) => job,
            Err(_) => {
                warn!(%job_id, "polled job no longer exists, stopping poller");
                stopped.store(true, Ordering::SeqCst);
                return;
            }
        };

        if !job.status.is_terminal() {
            continue;
        }

        // First terminal observation wins; a racing stop() call means
        // someone else already claimed the flag and we do nothing.
        if !stopped.swap(true, Ordering::SeqCst) {
            debug!(%job_id, status = %job.status, "terminal status observed");
            reconcile(&registry, &events, &job).await;
        }
        return;
    }
}

/// One-time reconciliation after a terminal status: refresh the document
/// snapshot and signal document-level completion when every batch is done.
async fn reconcile(registry: &DocumentRegistry, events: &EventsHandle, job: &JobState) {
    match registry.get(&job.doc_id).await {
        Ok(doc) if doc.all_completed() => {
            debug!(doc_id = %job.doc_id, "all batches completed");
            events.on_document_complete(job.doc_id.clone());
        }
        Ok(_) => {}
        Err(_) => {
            debug!(doc_id = %job.doc_id, "no document snapshot to reconcile");
        }
    }
}

/// Poll inline until the job reaches a terminal status, then return its
/// final state. Convenience for tests and sequential drivers; unlike
/// [`StatusPoller`] it performs no reconciliation.
pub async fn await_terminal(
    jobs: &JobStore,
    job_id: &str,
    poll_interval: Duration,
) -> Result<JobState, WorkbenchError> {
    loop {
        let job = jobs.get(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        sleep(poll_interval).await;
    }
}
