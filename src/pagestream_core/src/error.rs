//! Error types for pagestream_core.

use std::time::Duration;

use thiserror::Error;

use crate::store::PageIndex;

/// Error types for page operations.
///
/// Only the blocking [`load_page`](crate::PageStreamer::load_page) path and
/// configuration loading surface these to callers. Prefetch paths absorb them.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Page index out of range: index={index}, total_pages={total_pages}")]
    OutOfRange { index: PageIndex, total_pages: usize },

    #[error("Page {index} gave up after {attempts} failed attempts")]
    RetryExhausted { index: PageIndex, attempts: u32 },

    #[error("Failed to fetch page {index}: {reason}")]
    FetchFailed { index: PageIndex, reason: String },

    #[error("Page {index} was evicted while waiting for it")]
    Evicted { index: PageIndex },

    #[error("Timed out after {timeout:?} waiting for page {index}")]
    WaitTimeout { index: PageIndex, timeout: Duration },

    #[error("Failed to decode page: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Fetch executor unavailable: {0}")]
    ExecutorUnavailable(String),
}

/// Result type alias for page operations.
pub type PageResult<T> = Result<T, PageError>;
