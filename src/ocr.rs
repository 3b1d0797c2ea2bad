//! OCR collaborator traits and the per-page retry wrapper.
//!
//! The engine never produces markdown itself: a [`PageRenderer`] turns one
//! page of a spooled PDF into an image, and an [`OcrEngine`] turns that
//! image into markdown text. Both are injected by the host application,
//! which keeps the orchestration engine free of any model or rasteriser
//! dependency and lets tests script collaborator behaviour page by page.
//!
//! ## Retry Strategy
//!
//! OCR backends fail transiently and frequently under concurrent load.
//! [`ocr_page_with_retry`] wraps each call in a per-call timeout and an
//! exponential backoff loop (`retry_backoff_ms * 2^attempt`): with a
//! 500 ms base and 3 retries the wait sequence is 500 ms, 1 s, 2 s. A page
//! that still fails after the last attempt terminates its owning job; the
//! job is never retried automatically.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::warn;

use crate::config::WorkbenchConfig;
use crate::error::UpstreamError;

/// One rasterised page, ready for the OCR collaborator.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Absolute 1-based page number within the document.
    pub page: usize,
    /// Encoded image bytes (PNG in the reference renderer).
    pub bytes: Vec<u8>,
}

/// Failure reported by a collaborator implementation.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The OCR backend rejected or failed the request.
    #[error("upstream OCR failure: {0}")]
    Upstream(String),

    /// The requested page does not exist in the document.
    #[error("page {page} is out of range")]
    PageOutOfRange { page: usize },

    /// The page source could not be opened or rasterised.
    #[error("render failure: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Produces page images from a spooled PDF.
///
/// `page` arguments are 1-based throughout, matching batch page ranges.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document at `pdf_path`.
    async fn page_count(&self, pdf_path: &Path) -> Result<usize, OcrError>;

    /// Rasterise a single page.
    async fn render_page(&self, pdf_path: &Path, page: usize) -> Result<PageImage, OcrError>;
}

/// Converts one page image to markdown text. May fail per page.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn ocr_page(&self, image: &PageImage, model: &str) -> Result<String, OcrError>;
}

/// Run one OCR call with timeout, retry, and exponential backoff.
///
/// Timeouts count as retryable failures. The returned error carries the
/// full retry count so the job message tells the whole story.
pub async fn ocr_page_with_retry(
    engine: &Arc<dyn OcrEngine>,
    image: &PageImage,
    model: &str,
    config: &WorkbenchConfig,
) -> Result<String, UpstreamError> {
    let call_timeout = Duration::from_secs(config.ocr_timeout_secs);
    let mut last_err = UpstreamError::Api {
        page: image.page,
        retries: 0,
        detail: "no attempt made".to_string(),
    };

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                page = image.page,
                attempt,
                max = config.max_retries,
                backoff_ms = backoff,
                "retrying OCR call"
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, engine.ocr_page(image, model)).await {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(e)) => {
                warn!(page = image.page, attempt, error = %e, "OCR attempt failed");
                last_err = UpstreamError::Api {
                    page: image.page,
                    retries: config.max_retries,
                    detail: e.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    page = image.page,
                    attempt,
                    timeout_secs = config.ocr_timeout_secs,
                    "OCR attempt timed out"
                );
                last_err = UpstreamError::Timeout {
                    page: image.page,
                    secs: config.ocr_timeout_secs,
                };
            }
        }
    }

    Err(last_err)
}
