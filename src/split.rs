//! Batch splitter: partition a page count into contiguous page ranges.
//!
//! Pure and deterministic; the only validation gate between an upload
//! request and the creation of a [`crate::document::Document`]. Nothing is
//! registered anywhere when splitting fails.

use crate::document::Batch;
use crate::error::WorkbenchError;

/// Smallest accepted batch size.
pub const MIN_BATCH_SIZE: usize = 1;
/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 20;

/// Partition `[1, total_pages]` into ordered batches of `batch_size` pages.
///
/// Every batch spans exactly `batch_size` pages except possibly the last,
/// which spans the remainder (between 1 and `batch_size` pages). The
/// resulting list is ascending by index and by start page, with no gaps
/// and no overlaps.
///
/// # Errors
/// [`WorkbenchError::InvalidBatchSize`] when `batch_size` is outside
/// `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`;
/// [`WorkbenchError::InvalidPageCount`] when `total_pages < 1`.
pub fn split_into_batches(
    total_pages: usize,
    batch_size: usize,
) -> Result<Vec<Batch>, WorkbenchError> {
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(WorkbenchError::InvalidBatchSize {
            got: batch_size,
            min: MIN_BATCH_SIZE,
            max: MAX_BATCH_SIZE,
        });
    }
    if total_pages < 1 {
        return Err(WorkbenchError::InvalidPageCount { got: total_pages });
    }

    let mut batches = Vec::with_capacity(total_pages.div_ceil(batch_size));
    let mut start = 1;
    let mut index = 0;
    while start <= total_pages {
        let end = (start + batch_size - 1).min(total_pages);
        batches.push(Batch::new(index, start, end));
        start = end + 1;
        index += 1;
    }
    Ok(batches)
}
