//! Active window around the viewer's current page.

use crate::resource::ResourceHandle;
use crate::scheduler::PriorityScheduler;
use crate::store::{Evicted, PageIndex, PageState, PageStore, RequestDecision};

/// Center page plus the number of pages kept on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub center: PageIndex,
    pub radius: usize,
}

impl Window {
    pub fn new(center: PageIndex, radius: usize) -> Self {
        Self { center, radius }
    }

    /// Inclusive `[lo, hi]` clipped to the document, or `None` if empty.
    pub fn range(&self, total_pages: usize) -> Option<(PageIndex, PageIndex)> {
        if total_pages == 0 {
            return None;
        }
        let lo = self.center.saturating_sub(self.radius);
        let hi = self.center.saturating_add(self.radius).min(total_pages - 1);
        (lo <= hi).then_some((lo, hi))
    }

    /// Pages in the window ordered center-out: `c, c-1, c+1, c-2, c+2, ...`.
    pub fn fetch_order(&self, total_pages: usize) -> Vec<PageIndex> {
        let Some((lo, hi)) = self.range(total_pages) else {
            return Vec::new();
        };
        // Equal distances put `c - k` before `c + k`, which is the smaller index.
        let mut order: Vec<PageIndex> = (lo..=hi).collect();
        order.sort_by_key(|&index| (index.abs_diff(self.center), index));
        order
    }
}

/// Pages removed by an eviction sweep and the resources they held.
#[derive(Debug)]
pub struct EvictionSweep<R> {
    /// Evicted indices, ascending.
    pub evicted: Vec<PageIndex>,
    /// Resources the caller must release.
    pub released: Vec<ResourceHandle<R>>,
}

impl<R> Default for EvictionSweep<R> {
    fn default() -> Self {
        Self {
            evicted: Vec::new(),
            released: Vec::new(),
        }
    }
}

/// Result of a window recompute.
#[derive(Debug)]
pub struct WindowChange<R> {
    pub window: Window,
    /// Newly enqueued pages, in enqueue (center-out) order.
    pub enqueued: Vec<PageIndex>,
    pub sweep: EvictionSweep<R>,
}

/// Tracks the last center and keeps the store and scheduler in step with it.
#[derive(Debug, Default)]
pub struct WindowManager {
    /// `None` until the first window is set, so the first call always runs.
    last_center: Option<PageIndex>,
}

impl WindowManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_center(&self) -> Option<PageIndex> {
        self.last_center
    }

    /// Forget the last center; the next change always recomputes.
    pub fn reset(&mut self) {
        self.last_center = None;
    }

    /// Recompute the window for a new center.
    ///
    /// Returns `None` without touching anything when `center` equals the
    /// last center. Otherwise requests every page in the window center-out,
    /// enqueues the ones that need fetching, and evicts everything outside
    /// the window before returning.
    pub fn on_center_changed<R>(
        &mut self,
        center: PageIndex,
        radius: usize,
        total_pages: usize,
        store: &mut PageStore<R>,
        scheduler: &mut PriorityScheduler,
    ) -> Option<WindowChange<R>> {
        if self.last_center == Some(center) {
            return None;
        }
        self.last_center = Some(center);
        scheduler.set_center(center);

        let window = Window::new(center, radius);
        let mut enqueued = Vec::new();
        for index in window.fetch_order(total_pages) {
            if store.request(index, total_pages) == RequestDecision::Enqueue {
                scheduler.enqueue(index);
                enqueued.push(index);
            }
        }

        let sweep = match window.range(total_pages) {
            Some((lo, hi)) => Self::evict_outside_range(lo, hi, store, scheduler),
            None => Self::evict_all(store, scheduler),
        };

        Some(WindowChange {
            window,
            enqueued,
            sweep,
        })
    }

    /// Evict every known page with `index < lo || index > hi`.
    pub fn evict_outside_range<R>(
        lo: PageIndex,
        hi: PageIndex,
        store: &mut PageStore<R>,
        scheduler: &mut PriorityScheduler,
    ) -> EvictionSweep<R> {
        let outside = |index: &PageIndex| *index < lo || *index > hi;
        let mut targets: Vec<PageIndex> = store
            .indices()
            .chain(scheduler.pending())
            .filter(outside)
            .collect();
        targets.sort_unstable();
        targets.dedup();
        Self::evict_many(targets, store, scheduler)
    }

    /// Evict a single page. Absent pages are a no-op returning `None`.
    pub fn evict_index<R>(
        index: PageIndex,
        store: &mut PageStore<R>,
        scheduler: &mut PriorityScheduler,
    ) -> Option<Evicted<R>> {
        let was_pending = scheduler.cancel_pending(index);
        match store.evict(index) {
            Some(evicted) => Some(evicted),
            None if was_pending => Some(Evicted {
                state: PageState::Pending,
                handle: None,
            }),
            None => None,
        }
    }

    fn evict_all<R>(store: &mut PageStore<R>, scheduler: &mut PriorityScheduler) -> EvictionSweep<R> {
        let mut targets: Vec<PageIndex> = store.indices().chain(scheduler.pending()).collect();
        targets.sort_unstable();
        targets.dedup();
        Self::evict_many(targets, store, scheduler)
    }

    fn evict_many<R>(
        targets: Vec<PageIndex>,
        store: &mut PageStore<R>,
        scheduler: &mut PriorityScheduler,
    ) -> EvictionSweep<R> {
        let mut sweep = EvictionSweep::default();
        for index in targets {
            if let Some(evicted) = Self::evict_index(index, store, scheduler) {
                sweep.evicted.push(index);
                sweep.released.extend(evicted.handle);
            }
        }
        sweep
    }
}
