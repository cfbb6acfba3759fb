//! Where page fetches run.

use std::fmt;
use std::sync::Arc;

use crate::error::{PageError, PageResult};

/// A unit of fetch work: call the backend, then report back to the streamer.
pub type FetchJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs fetch jobs off the caller's thread.
///
/// Each job is submitted separately, so starts and completions interleave
/// rather than a whole burst draining in one go.
pub trait FetchExecutor: Send + Sync + 'static {
    fn spawn(&self, job: FetchJob);
}

/// Dedicated rayon pool sized to the fetch concurrency cap.
pub struct PoolExecutor {
    pool: Arc<rayon::ThreadPool>,
}

impl PoolExecutor {
    /// Build a pool with `threads` workers named `page-fetch-{n}`.
    pub fn new(threads: usize) -> PageResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|idx| format!("page-fetch-{}", idx))
            .build()
            .map_err(|e| PageError::ExecutorUnavailable(e.to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl FetchExecutor for PoolExecutor {
    fn spawn(&self, job: FetchJob) {
        self.pool.spawn(job);
    }
}

impl fmt::Debug for PoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolExecutor")
            .field("threads", &self.threads())
            .finish()
    }
}
