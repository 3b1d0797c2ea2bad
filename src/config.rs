//! Configuration for the batch workbench.
//!
//! All orchestration behaviour is controlled through [`WorkbenchConfig`],
//! built via its [`WorkbenchConfigBuilder`]. Keeping every knob in one
//! struct makes it trivial to share configs across tasks and to diff two
//! runs to understand why their behaviour differs.

use crate::error::WorkbenchError;
use crate::events::EventsHandle;
use std::fmt;
use std::path::PathBuf;

/// Configuration for a [`crate::workbench::Workbench`].
///
/// Built via [`WorkbenchConfig::builder()`] or
/// [`WorkbenchConfig::default()`].
///
/// # Example
/// ```rust
/// use mdbatch::WorkbenchConfig;
///
/// let config = WorkbenchConfig::builder()
///     .max_concurrent_jobs(2)
///     .poll_interval_ms(250)
///     .default_model("gpt-5-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct WorkbenchConfig {
    /// Directory holding spooled uploads and result artifacts.
    /// Default: `<system temp dir>/mdbatch`.
    pub artifact_dir: PathBuf,

    /// Maximum batch jobs processing pages at the same time. Default: 4.
    ///
    /// Dispatch itself never blocks: jobs beyond the cap sit in `pending`
    /// until a worker-pool permit frees up. A document with many batches
    /// can be dispatched all at once without overwhelming the OCR
    /// collaborator.
    pub max_concurrent_jobs: usize,

    /// Maximum retry attempts for one OCR call. Default: 3.
    ///
    /// Retries cover transient collaborator failures inside a single page.
    /// A page that still fails after all retries terminates its job; the
    /// job itself is never retried automatically.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff).
    /// Default: 500. Doubles after each attempt: 500 ms, 1 s, 2 s.
    pub retry_backoff_ms: u64,

    /// Per-OCR-call timeout in seconds. Default: 60.
    ///
    /// Bounds a stalled collaborator call so a job cannot hang
    /// indefinitely on one page.
    pub ocr_timeout_secs: u64,

    /// Interval between status-poller queries in milliseconds.
    /// Default: 500.
    pub poll_interval_ms: u64,

    /// Model identifier passed to the OCR collaborator when the caller
    /// does not name one. Default: `"gpt-5-mini"`.
    pub default_model: String,

    /// Optional event callback receiving job lifecycle notifications.
    pub events: Option<EventsHandle>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            artifact_dir: std::env::temp_dir().join("mdbatch"),
            max_concurrent_jobs: 4,
            max_retries: 3,
            retry_backoff_ms: 500,
            ocr_timeout_secs: 60,
            poll_interval_ms: 500,
            default_model: "gpt-5-mini".to_string(),
            events: None,
        }
    }
}

impl fmt::Debug for WorkbenchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbenchConfig")
            .field("artifact_dir", &self.artifact_dir)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("default_model", &self.default_model)
            .field("events", &self.events.as_ref().map(|_| "<dyn JobEvents>"))
            .finish()
    }
}

impl WorkbenchConfig {
    /// Create a new builder for `WorkbenchConfig`.
    pub fn builder() -> WorkbenchConfigBuilder {
        WorkbenchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`WorkbenchConfig`].
pub struct WorkbenchConfigBuilder {
    config: WorkbenchConfig,
}

impl WorkbenchConfigBuilder {
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = dir.into();
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(1);
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn events(mut self, events: EventsHandle) -> Self {
        self.config.events = Some(events);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkbenchConfig, WorkbenchError> {
        let c = &self.config;
        if c.max_concurrent_jobs == 0 {
            return Err(WorkbenchError::InvalidConfig(
                "max_concurrent_jobs must be >= 1".into(),
            ));
        }
        if c.poll_interval_ms == 0 {
            return Err(WorkbenchError::InvalidConfig(
                "poll_interval_ms must be >= 1".into(),
            ));
        }
        if c.ocr_timeout_secs == 0 {
            return Err(WorkbenchError::InvalidConfig(
                "ocr_timeout_secs must be >= 1".into(),
            ));
        }
        if c.default_model.is_empty() {
            return Err(WorkbenchError::InvalidConfig(
                "default_model must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
