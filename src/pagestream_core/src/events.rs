//! Change notifications for the viewer.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::store::PageIndex;

/// Something observable happened to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Queued for fetching.
    Enqueued(PageIndex),
    /// Fetch started.
    Started(PageIndex),
    /// Resource is resident and can be displayed.
    Resolved(PageIndex),
    /// Fetch failed; `failures` counts consecutive failures so far.
    Failed { index: PageIndex, failures: u32 },
    /// Failure cap reached; the page will not be fetched again until evicted.
    RetryExhausted(PageIndex),
    /// Record removed (window moved, explicit eviction).
    Evicted(PageIndex),
    /// A fetch finished for a page that was already evicted; its result was released.
    StaleDiscarded(PageIndex),
    /// Every page was dropped.
    Cleared,
}

/// Fan-out to any number of subscribers. Dropped receivers are pruned on send.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<PageEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<PageEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: PageEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = PageEvent>) {
        for event in events {
            if self.subscribers.is_empty() {
                return;
            }
            self.emit(event);
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives() {
        let mut bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(PageEvent::Resolved(3));
        assert_eq!(a.try_recv().unwrap(), PageEvent::Resolved(3));
        assert_eq!(b.try_recv().unwrap(), PageEvent::Resolved(3));
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let mut bus = EventBus::default();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        bus.emit(PageEvent::Cleared);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), PageEvent::Cleared);
    }

    #[test]
    fn test_emit_all_preserves_order() {
        let mut bus = EventBus::default();
        let rx = bus.subscribe();
        bus.emit_all([PageEvent::Enqueued(1), PageEvent::Started(1), PageEvent::Evicted(1)]);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![PageEvent::Enqueued(1), PageEvent::Started(1), PageEvent::Evicted(1)]
        );
    }
}
