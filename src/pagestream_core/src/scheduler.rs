//! Nearest-to-center page scheduling with a concurrency cap.
//!
//! The scheduler only decides *what* to start. The streamer runs the
//! fetches it hands out and reports completions back through `finish`.

use std::collections::{BTreeSet, HashSet};

use crate::store::{FetchTicket, PageIndex, PageStore};

/// Pending set plus in-flight tickets, ordered by distance from the center.
#[derive(Debug)]
pub struct PriorityScheduler {
    /// Pages waiting for a fetch slot.
    pending: BTreeSet<PageIndex>,
    /// Outstanding fetches. Keyed by ticket because a page evicted and
    /// re-requested can briefly have an old fetch and a new one outstanding.
    in_flight: HashSet<FetchTicket>,
    /// Distance reference for ordering, read at start time.
    center: PageIndex,
    max_concurrent: usize,
}

impl PriorityScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            pending: BTreeSet::new(),
            in_flight: HashSet::new(),
            center: 0,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Queue `index`. Returns false if it was already pending.
    pub fn enqueue(&mut self, index: PageIndex) -> bool {
        self.pending.insert(index)
    }

    /// Move the distance reference. Starts nothing by itself.
    pub fn set_center(&mut self, center: PageIndex) {
        self.center = center;
    }

    pub fn center(&self) -> PageIndex {
        self.center
    }

    /// Drop `index` from the pending set. In-flight fetches are unaffected.
    pub fn cancel_pending(&mut self, index: PageIndex) -> bool {
        self.pending.remove(&index)
    }

    /// The pending page nearest the center; ties go to the smaller index.
    pub fn peek_next(&self) -> Option<PageIndex> {
        self.pending
            .iter()
            .copied()
            .min_by_key(|&index| (index.abs_diff(self.center), index))
    }

    /// Free fetch slots.
    pub fn available_slots(&self) -> usize {
        self.max_concurrent.saturating_sub(self.in_flight.len())
    }

    /// Start as many pending pages as the cap allows, nearest first.
    ///
    /// Each chosen page moves Pending -> InFlight in `store`. Pages whose
    /// record is no longer pending are dropped from the queue without using
    /// a slot. Never returns more than `available_slots()` tickets.
    pub fn start_batch<R>(&mut self, store: &mut PageStore<R>) -> Vec<FetchTicket> {
        let mut started = Vec::new();
        while self.available_slots() > 0 {
            let Some(index) = self.peek_next() else {
                break;
            };
            self.pending.remove(&index);
            if let Some(ticket) = store.begin_fetch(index) {
                self.in_flight.insert(ticket);
                started.push(ticket);
            }
        }
        started
    }

    /// Release the slot held by `ticket`. Returns false for unknown tickets.
    pub fn finish(&mut self, ticket: FetchTicket) -> bool {
        self.in_flight.remove(&ticket)
    }

    /// Drop every pending page.
    ///
    /// Outstanding fetches keep their slots until `finish`, so fetches that
    /// outlive a clear still count against the cap.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, index: PageIndex) -> bool {
        self.pending.contains(&index)
    }

    /// Pending indices, ascending.
    pub fn pending(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.pending.iter().copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Nothing pending and nothing outstanding.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}
