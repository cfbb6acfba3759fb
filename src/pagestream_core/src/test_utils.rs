//! Shared fixtures for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{PageError, PageResult};
use crate::executor::{FetchExecutor, FetchJob};
use crate::resource::PageBackend;
use crate::store::PageIndex;

/// Resource produced by [`RecordingBackend`]. `serial` is unique per fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPage {
    pub index: PageIndex,
    pub serial: u64,
}

#[derive(Debug, Default)]
struct Recorded {
    fetched: Vec<PageIndex>,
    released: HashMap<PageIndex, u32>,
    released_serials: Vec<u64>,
    failing: HashSet<PageIndex>,
    panicking: HashSet<PageIndex>,
    next_serial: u64,
}

/// In-memory backend that records every fetch and release.
///
/// Clones share the same record, so a test can keep a probe after handing
/// the backend to a streamer.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto the same record.
    pub fn probe(&self) -> Self {
        self.clone()
    }

    /// Make every fetch of `index` fail until healed.
    pub fn fail_page(&self, index: PageIndex) {
        self.inner.lock().failing.insert(index);
    }

    pub fn heal_page(&self, index: PageIndex) {
        self.inner.lock().failing.remove(&index);
    }

    /// Make every fetch of `index` panic.
    pub fn panic_on(&self, index: PageIndex) {
        self.inner.lock().panicking.insert(index);
    }

    /// Indices in the order fetches were issued.
    pub fn fetch_order(&self) -> Vec<PageIndex> {
        self.inner.lock().fetched.clone()
    }

    pub fn fetch_count(&self, index: PageIndex) -> usize {
        self.inner.lock().fetched.iter().filter(|&&i| i == index).count()
    }

    pub fn release_count(&self, index: PageIndex) -> u32 {
        self.inner.lock().released.get(&index).copied().unwrap_or(0)
    }

    pub fn total_released(&self) -> u32 {
        self.inner.lock().released.values().sum()
    }

    pub fn released_serials(&self) -> Vec<u64> {
        self.inner.lock().released_serials.clone()
    }
}

impl PageBackend for RecordingBackend {
    type Resource = TestPage;

    fn fetch_page(&self, index: PageIndex) -> PageResult<TestPage> {
        let (serial, fail, panic) = {
            let mut inner = self.inner.lock();
            inner.fetched.push(index);
            let serial = inner.next_serial;
            inner.next_serial += 1;
            (
                serial,
                inner.failing.contains(&index),
                inner.panicking.contains(&index),
            )
        };
        if panic {
            panic!("injected panic for page {index}");
        }
        if fail {
            return Err(PageError::FetchFailed {
                index,
                reason: "injected failure".into(),
            });
        }
        Ok(TestPage { index, serial })
    }

    fn release_resource(&self, resource: TestPage) {
        let mut inner = self.inner.lock();
        *inner.released.entry(resource.index).or_insert(0) += 1;
        inner.released_serials.push(resource.serial);
    }
}

/// Executor that queues jobs until the test runs them.
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<VecDeque<FetchJob>>,
    arrived: Condvar,
}

impl ManualExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queued(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run the oldest queued job. Returns false if none was queued.
    pub fn run_next(&self) -> bool {
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until the queue stays empty, including jobs queued by jobs.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Block until at least `count` jobs are queued.
    pub fn wait_for_jobs(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut jobs = self.jobs.lock();
        while jobs.len() < count {
            if self.arrived.wait_until(&mut jobs, deadline).timed_out() {
                return jobs.len() >= count;
            }
        }
        true
    }
}

impl FetchExecutor for ManualExecutor {
    fn spawn(&self, job: FetchJob) {
        self.jobs.lock().push_back(job);
        self.arrived.notify_all();
    }
}

/// Write `files` (name, contents) into `dir` and return their paths.
pub fn write_pages(dir: &Path, files: &[(&str, &str)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, contents)| {
            let path = dir.join(name);
            fs::write(&path, contents).unwrap();
            path
        })
        .collect()
}
