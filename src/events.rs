//! Event-callback trait for job lifecycle notifications.
//!
//! Inject an `Arc<dyn JobEvents>` via
//! [`crate::config::WorkbenchConfigBuilder::events`] to receive events as
//! dispatched jobs progress and as pollers observe terminal states.
//! Callers can forward events to a channel, a WebSocket, a database row,
//! or a terminal progress bar; the library knows nothing about how the
//! host application communicates.
//!
//! All methods have default no-op implementations so callers only
//! override what they care about. Implementations must be `Send + Sync`:
//! jobs run on `tokio::spawn` tasks and several may fire events
//! concurrently. String parameters are passed owned so the trait object
//! can be invoked from spawned tasks without lifetime gymnastics.

use std::sync::Arc;

/// Called by dispatch tasks and pollers as jobs move through their
/// lifecycle.
pub trait JobEvents: Send + Sync {
    /// A job was created and queued for a worker-pool permit.
    fn on_job_queued(&self, job_id: String, total_pages: usize) {
        let _ = (job_id, total_pages);
    }

    /// A job acquired its permit and began processing pages.
    fn on_job_started(&self, job_id: String) {
        let _ = job_id;
    }

    /// A page finished OCR. `page` is the absolute 1-based page number;
    /// `total_pages` is the page count of the job's range.
    fn on_page_done(&self, job_id: String, page: usize, total_pages: usize) {
        let _ = (job_id, page, total_pages);
    }

    /// A job finished every page and stored its result artifact.
    fn on_job_complete(&self, job_id: String, result_filename: String) {
        let _ = (job_id, result_filename);
    }

    /// A job terminated with an error.
    fn on_job_error(&self, job_id: String, message: String) {
        let _ = (job_id, message);
    }

    /// A poller's reconciliation found every batch of the document
    /// `completed`. Fired at most once per poller.
    fn on_document_complete(&self, doc_id: String) {
        let _ = doc_id;
    }
}

/// A no-op implementation for callers that don't need events.
///
/// This is the default when no callback is configured.
pub struct NoopJobEvents;

impl JobEvents for NoopJobEvents {}

/// Convenience alias matching the type stored in
/// [`crate::config::WorkbenchConfig`].
pub type EventsHandle = Arc<dyn JobEvents>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEvents {
        pages: Arc<AtomicUsize>,
        completes: Arc<AtomicUsize>,
        errors: Arc<AtomicUsize>,
    }

    impl JobEvents for CountingEvents {
        fn on_page_done(&self, _job_id: String, _page: usize, _total: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }
        fn on_job_complete(&self, _job_id: String, _result: String) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_job_error(&self, _job_id: String, _message: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_events_do_not_panic() {
        let events = NoopJobEvents;
        events.on_job_queued("job_1".into(), 10);
        events.on_job_started("job_1".into());
        events.on_page_done("job_1".into(), 3, 10);
        events.on_job_complete("job_1".into(), "out.md".into());
        events.on_job_error("job_2".into(), "boom".into());
        events.on_document_complete("doc_1".into());
    }

    #[tokio::test]
    async fn events_handle_is_usable_from_spawned_tasks() {
        let pages = Arc::new(AtomicUsize::new(0));
        let completes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let events: EventsHandle = Arc::new(CountingEvents {
            pages: Arc::clone(&pages),
            completes: Arc::clone(&completes),
            errors: Arc::clone(&errors),
        });

        let cloned = Arc::clone(&events);
        tokio::spawn(async move {
            cloned.on_page_done("job_1".into(), 1, 2);
            cloned.on_page_done("job_1".into(), 2, 2);
            cloned.on_job_complete("job_1".into(), "out.md".into());
        })
        .await
        .expect("spawn must succeed");

        assert_eq!(pages.load(Ordering::SeqCst), 2);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }
}
