//! PageStream Core - Windowed page streaming for comic viewers.
//!
//! This crate provides:
//! - A per-page state machine with retry capping and exactly-once resource release
//! - Nearest-to-center fetch scheduling with a concurrency cap
//! - A sliding window that prefetches center-out and evicts everything outside it
//! - Parallel fetching on a dedicated rayon pool
//! - A directory backend serving page images in natural order

mod backend;
mod config;
mod decoder;
mod error;
mod events;
mod executor;
mod resource;
mod retry;
mod scheduler;
mod store;
mod streamer;
mod window;
#[cfg(test)]
pub(crate) mod test_utils;

pub use backend::DirectoryBackend;
pub use config::{StreamConfig, MAX_RADIUS};
pub use decoder::{
    is_image_file, mime_type_for, natural_cmp, probe_jpeg_dimensions, read_page_image, PageImage,
    IMAGE_EXTENSIONS,
};
pub use error::{PageError, PageResult};
pub use events::PageEvent;
pub use executor::{FetchExecutor, FetchJob, PoolExecutor};
pub use resource::{PageBackend, ResourceHandle};
pub use retry::RetryPolicy;
pub use scheduler::PriorityScheduler;
pub use store::{
    Completion, Evicted, FailOutcome, FetchTicket, PageIndex, PageRecord, PageState, PageStore,
    RequestDecision, SkipReason,
};
pub use streamer::{PageStreamer, StreamStats};
pub use window::{EvictionSweep, Window, WindowChange, WindowManager};
