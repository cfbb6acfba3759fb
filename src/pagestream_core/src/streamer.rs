//! Page streamer: the public facade over store, scheduler and window.
//!
//! All bookkeeping lives behind one mutex and every public operation is a
//! single critical section, so the scheduler never observes a half-applied
//! step. Backend calls (`fetch_page`, `release_resource`) always happen with
//! the lock released.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::{fetch_timing_enabled, StreamConfig};
use crate::error::{PageError, PageResult};
use crate::events::{EventBus, PageEvent};
use crate::executor::{FetchExecutor, PoolExecutor};
use crate::resource::{PageBackend, ResourceHandle};
use crate::retry::RetryPolicy;
use crate::scheduler::PriorityScheduler;
use crate::store::{
    Completion, FailOutcome, FetchTicket, PageIndex, PageState, PageStore, RequestDecision,
    SkipReason,
};
use crate::window::WindowManager;

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Pages with a resident resource.
    pub resident: usize,
    /// Pages waiting for a fetch slot.
    pub pending: usize,
    /// Fetches currently outstanding.
    pub in_flight: usize,
    pub started: u64,
    pub resolved: u64,
    pub failed: u64,
    /// Fetches that finished after their page was evicted.
    pub stale: u64,
    /// Resources handed back to the backend.
    pub released: u64,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    resolved: AtomicU64,
    failed: AtomicU64,
    stale: AtomicU64,
    released: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.started,
            &self.resolved,
            &self.failed,
            &self.stale,
            &self.released,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

struct EngineState<R> {
    store: PageStore<R>,
    scheduler: PriorityScheduler,
    window: WindowManager,
    events: EventBus,
}

struct Shared<B: PageBackend> {
    backend: B,
    executor: Arc<dyn FetchExecutor>,
    config: StreamConfig,
    state: Mutex<EngineState<B::Resource>>,
    /// Signalled whenever a page resolves, fails, or is evicted.
    changed: Condvar,
    counters: Counters,
    /// Whether per-fetch timing is enabled (cached from PAGESTREAM_FETCH_TIMING).
    fetch_timing: bool,
}

/// Windowed page cache for one open document.
///
/// ```no_run
/// use pagestream_core::{DirectoryBackend, PageStreamer, StreamConfig};
///
/// let backend = DirectoryBackend::open("/comics/volume-1".as_ref())?;
/// let total = backend.page_count();
/// let streamer = PageStreamer::new(backend, StreamConfig::default())?;
///
/// // Viewer scrolled to page 12: keep 9..=15 resident, fetch center-out.
/// streamer.set_current_index(12, total);
///
/// // Block (up to the configured timeout) for the page on screen.
/// let page = streamer.load_page(12, total)?;
/// println!("{} bytes of {}", page.bytes.len(), page.mime);
/// # Ok::<(), pagestream_core::PageError>(())
/// ```
pub struct PageStreamer<B: PageBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: PageBackend> Clone for PageStreamer<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: PageBackend> PageStreamer<B> {
    /// Create a streamer with its own fetch pool of `max_concurrent` threads.
    pub fn new(backend: B, config: StreamConfig) -> PageResult<Self> {
        config.validate()?;
        let executor = Arc::new(PoolExecutor::new(config.max_concurrent)?);
        Self::with_executor(backend, config, executor)
    }

    /// Create a streamer that submits fetches to `executor`.
    pub fn with_executor(
        backend: B,
        config: StreamConfig,
        executor: Arc<dyn FetchExecutor>,
    ) -> PageResult<Self> {
        config.validate()?;
        let state = EngineState {
            store: PageStore::new(RetryPolicy::new(config.max_retry)),
            scheduler: PriorityScheduler::new(config.max_concurrent),
            window: WindowManager::new(),
            events: EventBus::default(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                executor,
                config,
                state: Mutex::new(state),
                changed: Condvar::new(),
                counters: Counters::default(),
                fetch_timing: fetch_timing_enabled(),
            }),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Ask for one page. Out-of-range, resident, queued and retry-exhausted
    /// pages are skipped silently.
    pub fn request_page(&self, index: PageIndex, total_pages: usize) -> RequestDecision {
        let (decision, tickets) = {
            let mut state = self.shared.state.lock();
            let decision = Shared::<B>::request_locked(&mut state, index, total_pages);
            let tickets = self.shared.start_ready(&mut state);
            (decision, tickets)
        };
        self.shared.spawn_fetches(tickets);
        decision
    }

    /// Move the window to `center`, fetching center-out and evicting
    /// everything outside `[center - radius, center + radius]`.
    ///
    /// Eviction completes before this returns. Calling again with the same
    /// center does nothing.
    ///
    /// `radius` is clamped to [`MAX_RADIUS`](crate::MAX_RADIUS): with a radius
    /// of 60, pages at distance 51 to 60 are evicted, not kept.
    pub fn set_window(&self, center: PageIndex, radius: usize, total_pages: usize) {
        self.shared.set_window(center, StreamConfig::clamped_radius(radius), total_pages);
    }

    /// `set_window` with the configured radius.
    pub fn set_current_index(&self, center: PageIndex, total_pages: usize) {
        self.shared.set_window(center, self.shared.config.radius, total_pages);
    }

    /// Discard one page, cancelling its fetch if outstanding. Returns false
    /// if the page was unknown.
    pub fn evict_index(&self, index: PageIndex) -> bool {
        let evicted = {
            let mut state = self.shared.state.lock();
            let EngineState {
                store, scheduler, ..
            } = &mut *state;
            let evicted = WindowManager::evict_index(index, store, scheduler);
            if evicted.is_some() {
                debug!(index, "page evicted");
                state.events.emit(PageEvent::Evicted(index));
            }
            evicted
        };

        let Some(evicted) = evicted else {
            return false;
        };
        self.shared.changed.notify_all();
        if let Some(handle) = evicted.handle {
            self.shared.release(handle);
        }
        true
    }

    /// Drop every page and release every resident resource. The next window
    /// change always recomputes.
    ///
    /// Outstanding fetches keep their slots until they return; their results
    /// come back stale and are released.
    pub fn clear(&self) {
        let handles = {
            let mut state = self.shared.state.lock();
            let handles = state.store.clear();
            state.scheduler.clear();
            state.window.reset();
            state.events.emit(PageEvent::Cleared);
            handles
        };
        self.shared.changed.notify_all();

        let released = handles.len();
        for handle in handles {
            self.shared.release(handle);
        }
        info!(released, "page cache cleared");
    }

    /// Start queued fetches up to the concurrency cap.
    pub fn pump(&self) {
        self.shared.pump();
    }

    /// Return page `index`, fetching it if needed and waiting up to the
    /// configured timeout.
    ///
    /// This is the only path that reports failures: the fetch it waited on
    /// failing, the page being evicted meanwhile, the retry cap, or the
    /// timeout.
    pub fn load_page(&self, index: PageIndex, total_pages: usize) -> PageResult<B::Resource> {
        if index >= total_pages {
            return Err(PageError::OutOfRange { index, total_pages });
        }
        let timeout = self.shared.config.wait_timeout();
        let deadline = Instant::now() + timeout;

        let (generation, failures_before, tickets) = {
            let mut state = self.shared.state.lock();
            if let Some(resource) = state.store.resource(index) {
                return Ok(resource.clone());
            }
            let decision = Shared::<B>::request_locked(&mut state, index, total_pages);
            if decision == RequestDecision::Skip(SkipReason::RetryExhausted) {
                let attempts = state.store.get(index).map_or(0, |r| r.failure_count());
                return Err(PageError::RetryExhausted { index, attempts });
            }
            let Some(record) = state.store.get(index) else {
                return Err(PageError::Evicted { index });
            };
            let watched = (record.generation(), record.failure_count());
            let tickets = self.shared.start_ready(&mut state);
            (watched.0, watched.1, tickets)
        };
        self.shared.spawn_fetches(tickets);

        let mut state = self.shared.state.lock();
        let mut timed_out = false;
        loop {
            match state.store.get(index) {
                Some(record) if record.generation() == generation => {
                    if let Some(resource) = record.resource() {
                        return Ok(resource.clone());
                    }
                    if record.failure_count() > failures_before {
                        return Err(PageError::FetchFailed {
                            index,
                            reason: record.last_error().unwrap_or("unknown error").to_string(),
                        });
                    }
                }
                _ => return Err(PageError::Evicted { index }),
            }
            if timed_out {
                return Err(PageError::WaitTimeout { index, timeout });
            }
            timed_out = self.shared.changed.wait_until(&mut state, deadline).timed_out();
        }
    }

    /// Clone of the resident resource for `index`.
    pub fn resource(&self, index: PageIndex) -> Option<B::Resource> {
        self.shared.state.lock().store.resource(index).cloned()
    }

    pub fn state(&self, index: PageIndex) -> Option<PageState> {
        self.shared.state.lock().store.state(index)
    }

    pub fn is_resident(&self, index: PageIndex) -> bool {
        self.state(index) == Some(PageState::Resolved)
    }

    /// Consecutive failures recorded for `index` (0 if unknown).
    pub fn failure_count(&self, index: PageIndex) -> u32 {
        self.shared
            .state
            .lock()
            .store
            .get(index)
            .map_or(0, |r| r.failure_count())
    }

    /// Resident page indices, ascending.
    pub fn resident_indices(&self) -> Vec<PageIndex> {
        self.shared.state.lock().store.resident_indices()
    }

    /// Center of the last applied window, if any.
    pub fn last_center(&self) -> Option<PageIndex> {
        self.shared.state.lock().window.last_center()
    }

    /// Receive page events from now on.
    pub fn subscribe(&self) -> Receiver<PageEvent> {
        self.shared.state.lock().events.subscribe()
    }

    pub fn stats(&self) -> StreamStats {
        let (resident, pending, in_flight) = {
            let state = self.shared.state.lock();
            (
                state.store.resident_count(),
                state.scheduler.pending_len(),
                state.scheduler.in_flight_len(),
            )
        };
        let counters = &self.shared.counters;
        StreamStats {
            resident,
            pending,
            in_flight,
            started: counters.started.load(Ordering::Relaxed),
            resolved: counters.resolved.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            stale: counters.stale.load(Ordering::Relaxed),
            released: counters.released.load(Ordering::Relaxed),
        }
    }

    /// Reset the cumulative counters to zero.
    pub fn reset_stats(&self) {
        self.shared.counters.reset();
    }
}

impl<B: PageBackend> Shared<B> {
    fn request_locked(
        state: &mut EngineState<B::Resource>,
        index: PageIndex,
        total_pages: usize,
    ) -> RequestDecision {
        let decision = state.store.request(index, total_pages);
        match decision {
            RequestDecision::Enqueue => {
                state.scheduler.enqueue(index);
                state.events.emit(PageEvent::Enqueued(index));
                debug!(index, "page enqueued");
            }
            RequestDecision::Skip(SkipReason::RetryExhausted) => {
                debug!(index, "page skipped: retry cap reached");
            }
            RequestDecision::Skip(_) => {}
        }
        decision
    }

    fn set_window(self: &Arc<Self>, center: PageIndex, radius: usize, total_pages: usize) {
        let (released, tickets) = {
            let mut state = self.state.lock();
            let EngineState {
                store,
                scheduler,
                window,
                events,
            } = &mut *state;
            let Some(change) =
                window.on_center_changed(center, radius, total_pages, store, scheduler)
            else {
                return;
            };

            debug!(
                center,
                radius,
                total_pages,
                enqueued = change.enqueued.len(),
                evicted = change.sweep.evicted.len(),
                "window moved"
            );
            events.emit_all(change.enqueued.iter().map(|&i| PageEvent::Enqueued(i)));
            events.emit_all(change.sweep.evicted.iter().map(|&i| PageEvent::Evicted(i)));

            let tickets = self.start_ready(&mut state);
            (change.sweep.released, tickets)
        };

        if !released.is_empty() {
            self.changed.notify_all();
        }
        for handle in released {
            self.release(handle);
        }
        self.spawn_fetches(tickets);
    }

    fn pump(self: &Arc<Self>) {
        let tickets = {
            let mut state = self.state.lock();
            self.start_ready(&mut state)
        };
        self.spawn_fetches(tickets);
    }

    /// Claim fetch slots under the lock. The caller spawns after unlocking.
    fn start_ready(&self, state: &mut EngineState<B::Resource>) -> Vec<FetchTicket> {
        let EngineState {
            store,
            scheduler,
            events,
            ..
        } = state;
        let tickets = scheduler.start_batch(store);
        for ticket in &tickets {
            Counters::bump(&self.counters.started);
            events.emit(PageEvent::Started(ticket.index()));
            debug!(index = ticket.index(), "fetch started");
        }
        tickets
    }

    fn spawn_fetches(self: &Arc<Self>, tickets: Vec<FetchTicket>) {
        for ticket in tickets {
            let shared = Arc::clone(self);
            self.executor.spawn(Box::new(move || shared.run_fetch(ticket)));
        }
    }

    fn run_fetch(self: &Arc<Self>, ticket: FetchTicket) {
        let index = ticket.index();
        let t0 = if self.fetch_timing {
            Some(Instant::now())
        } else {
            None
        };

        let result = catch_unwind(AssertUnwindSafe(|| self.backend.fetch_page(index)))
            .unwrap_or_else(|_| {
                Err(PageError::FetchFailed {
                    index,
                    reason: "fetch panicked".into(),
                })
            });

        if let Some(t) = t0 {
            debug!(index, elapsed = ?t.elapsed(), ok = result.is_ok(), "fetch timing");
        }

        let (stale, tickets) = {
            let mut state = self.state.lock();
            state.scheduler.finish(ticket);
            let stale = match result {
                Ok(resource) => match state.store.complete_fetch(ticket, resource) {
                    Completion::Accepted => {
                        Counters::bump(&self.counters.resolved);
                        state.events.emit(PageEvent::Resolved(index));
                        debug!(index, "page resolved");
                        None
                    }
                    Completion::Stale(handle) => {
                        Counters::bump(&self.counters.stale);
                        state.events.emit(PageEvent::StaleDiscarded(index));
                        debug!(index, "stale completion discarded");
                        Some(handle)
                    }
                },
                Err(err) => {
                    match state.store.fail_fetch(ticket, err.to_string()) {
                        FailOutcome::Recorded {
                            failures,
                            exhausted,
                        } => {
                            Counters::bump(&self.counters.failed);
                            warn!(index, failures, error = %err, "page fetch failed");
                            state.events.emit(PageEvent::Failed { index, failures });
                            if exhausted {
                                warn!(index, failures, "page retry cap reached");
                                state.events.emit(PageEvent::RetryExhausted(index));
                            }
                        }
                        FailOutcome::Stale => {
                            debug!(index, error = %err, "fetch failed after eviction");
                        }
                    }
                    None
                }
            };
            let tickets = self.start_ready(&mut state);
            (stale, tickets)
        };

        self.changed.notify_all();
        if let Some(handle) = stale {
            self.release(handle);
        }
        self.spawn_fetches(tickets);
    }

    fn release(&self, handle: ResourceHandle<B::Resource>) {
        handle.release(&self.backend);
        Counters::bump(&self.counters.released);
    }
}

impl<B: PageBackend> Drop for Shared<B> {
    fn drop(&mut self) {
        // Last reference gone (no fetch job can still be running): closing
        // the document releases whatever is still resident.
        let handles = self.state.get_mut().store.clear();
        for handle in handles {
            handle.release(&self.backend);
        }
    }
}
