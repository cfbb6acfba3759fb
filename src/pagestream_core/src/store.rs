//! Per-page records: resident resources, request state and failure counts.
//!
//! The store is a plain owned structure. It performs no I/O and never calls
//! the backend; resources leaving it are returned as [`ResourceHandle`]s for
//! the caller to release.

use std::collections::HashMap;

use crate::resource::ResourceHandle;
use crate::retry::RetryPolicy;

/// Stable page identity within one open document.
pub type PageIndex = usize;

/// Identifies one fetch attempt.
///
/// A completion is only accepted when its ticket matches the record's
/// current in-flight ticket, so results from a fetch whose page was evicted
/// (and possibly re-requested since) are recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    index: PageIndex,
    serial: u64,
}

impl FetchTicket {
    pub fn index(&self) -> PageIndex {
        self.index
    }
}

/// Externally visible state of a page record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Known but not queued; the last attempt failed and retries remain.
    Idle,
    /// Waiting for a fetch slot.
    Pending,
    /// A fetch is outstanding.
    InFlight,
    /// Resource is resident.
    Resolved,
    /// Failed `max_retry` times; not requested again until evicted.
    Failed,
}

/// Why a request did not enqueue anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutOfRange,
    Resolved,
    Pending,
    InFlight,
    RetryExhausted,
}

/// Outcome of [`PageStore::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// The record moved to `Pending`; the caller must enqueue it.
    Enqueue,
    Skip(SkipReason),
}

/// Outcome of [`PageStore::complete_fetch`].
#[derive(Debug)]
#[must_use]
pub enum Completion<R> {
    /// Stored as the page's resident resource.
    Accepted,
    /// The page was evicted while the fetch ran. Release immediately.
    Stale(ResourceHandle<R>),
}

/// Outcome of [`PageStore::fail_fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Recorded { failures: u32, exhausted: bool },
    /// The page was evicted while the fetch ran; nothing recorded.
    Stale,
}

/// What eviction removed.
#[derive(Debug)]
pub struct Evicted<R> {
    /// State the record was in.
    pub state: PageState,
    /// Resident resource, if any, to be released by the caller.
    pub handle: Option<ResourceHandle<R>>,
}

enum Slot<R> {
    Idle,
    Pending,
    InFlight(FetchTicket),
    Resolved(ResourceHandle<R>),
}

/// Record for one requested or resident page.
pub struct PageRecord<R> {
    index: PageIndex,
    slot: Slot<R>,
    failure_count: u32,
    last_error: Option<String>,
    /// Distinguishes this record from one recreated after eviction.
    generation: u64,
}

impl<R> PageRecord<R> {
    pub fn index(&self) -> PageIndex {
        self.index
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resource(&self) -> Option<&R> {
        match &self.slot {
            Slot::Resolved(handle) => Some(handle.resource()),
            _ => None,
        }
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.slot, Slot::Resolved(_))
    }

    fn state(&self, retry: &RetryPolicy) -> PageState {
        match self.slot {
            Slot::Idle if retry.is_exhausted(self.failure_count) => PageState::Failed,
            Slot::Idle => PageState::Idle,
            Slot::Pending => PageState::Pending,
            Slot::InFlight(_) => PageState::InFlight,
            Slot::Resolved(_) => PageState::Resolved,
        }
    }
}

/// Owns every page record of the open document.
pub struct PageStore<R> {
    records: HashMap<PageIndex, PageRecord<R>>,
    retry: RetryPolicy,
    next_serial: u64,
    next_generation: u64,
}

impl<R> PageStore<R> {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            records: HashMap::new(),
            retry,
            next_serial: 0,
            next_generation: 0,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn get(&self, index: PageIndex) -> Option<&PageRecord<R>> {
        self.records.get(&index)
    }

    pub fn state(&self, index: PageIndex) -> Option<PageState> {
        self.records.get(&index).map(|r| r.state(&self.retry))
    }

    pub fn resource(&self, index: PageIndex) -> Option<&R> {
        self.records.get(&index)?.resource()
    }

    /// Register interest in `index` and decide whether it needs a fetch.
    pub fn request(&mut self, index: PageIndex, total_pages: usize) -> RequestDecision {
        if index >= total_pages {
            return RequestDecision::Skip(SkipReason::OutOfRange);
        }

        if let Some(record) = self.records.get_mut(&index) {
            let reason = match record.slot {
                Slot::Resolved(_) => Some(SkipReason::Resolved),
                Slot::Pending => Some(SkipReason::Pending),
                Slot::InFlight(_) => Some(SkipReason::InFlight),
                Slot::Idle if self.retry.is_exhausted(record.failure_count) => {
                    Some(SkipReason::RetryExhausted)
                }
                Slot::Idle => None,
            };
            return match reason {
                Some(reason) => RequestDecision::Skip(reason),
                None => {
                    record.slot = Slot::Pending;
                    RequestDecision::Enqueue
                }
            };
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.records.insert(
            index,
            PageRecord {
                index,
                slot: Slot::Pending,
                failure_count: 0,
                last_error: None,
                generation,
            },
        );
        RequestDecision::Enqueue
    }

    /// Pending -> InFlight. Returns `None` if the record is not pending.
    pub fn begin_fetch(&mut self, index: PageIndex) -> Option<FetchTicket> {
        let record = self.records.get_mut(&index)?;
        if !matches!(record.slot, Slot::Pending) {
            return None;
        }
        let ticket = FetchTicket {
            index,
            serial: self.next_serial,
        };
        self.next_serial += 1;
        record.slot = Slot::InFlight(ticket);
        Some(ticket)
    }

    /// Store a fetched resource, or hand it back if the fetch went stale.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, resource: R) -> Completion<R> {
        let handle = ResourceHandle::new(ticket.index, resource);
        match self.records.get_mut(&ticket.index) {
            Some(record) if matches!(record.slot, Slot::InFlight(t) if t == ticket) => {
                record.slot = Slot::Resolved(handle);
                record.failure_count = 0;
                record.last_error = None;
                Completion::Accepted
            }
            _ => Completion::Stale(handle),
        }
    }

    /// InFlight -> Idle with one more failure recorded.
    pub fn fail_fetch(&mut self, ticket: FetchTicket, reason: impl Into<String>) -> FailOutcome {
        match self.records.get_mut(&ticket.index) {
            Some(record) if matches!(record.slot, Slot::InFlight(t) if t == ticket) => {
                record.slot = Slot::Idle;
                record.failure_count = (record.failure_count + 1).min(self.retry.max_attempts());
                record.last_error = Some(reason.into());
                FailOutcome::Recorded {
                    failures: record.failure_count,
                    exhausted: self.retry.is_exhausted(record.failure_count),
                }
            }
            _ => FailOutcome::Stale,
        }
    }

    /// Drop the record for `index`. Absent indices return `None`.
    ///
    /// An in-flight fetch is cancelled implicitly: its ticket no longer
    /// matches any record, so its completion comes back as stale.
    pub fn evict(&mut self, index: PageIndex) -> Option<Evicted<R>> {
        let record = self.records.remove(&index)?;
        let state = record.state(&self.retry);
        let handle = match record.slot {
            Slot::Resolved(handle) => Some(handle),
            _ => None,
        };
        Some(Evicted { state, handle })
    }

    /// Drop every record, returning all resident resources.
    pub fn clear(&mut self) -> Vec<ResourceHandle<R>> {
        self.records
            .drain()
            .filter_map(|(_, record)| match record.slot {
                Slot::Resolved(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    /// Indices of every record, in no particular order.
    pub fn indices(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.records.keys().copied()
    }

    /// Indices with a resident resource, ascending.
    pub fn resident_indices(&self) -> Vec<PageIndex> {
        let mut indices: Vec<_> = self
            .records
            .values()
            .filter(|r| r.is_resident())
            .map(|r| r.index)
            .collect();
        indices.sort_unstable();
        indices
    }

    pub fn resident_count(&self) -> usize {
        self.records.values().filter(|r| r.is_resident()).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
