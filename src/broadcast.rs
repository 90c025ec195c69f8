use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use crate::ChangeEvent;

/// What a live subscriber actually receives.
///
/// `Resync` replaces events lost to queue overflow: the subscriber's view
/// may be stale and it should re-fetch current state instead of trusting
/// the event stream alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Change(ChangeEvent),
    Resync,
}

/// Fan-out hub between the index/watcher and live sessions.
///
/// Built on a bounded broadcast channel: subscribers never see events
/// accepted before their registration, see everything after it exactly once
/// and in order, and a slow subscriber overflows independently (surfacing as
/// `Resync`) without blocking the producer or its peers. De-registration is
/// dropping the [`Subscription`].
#[derive(Debug)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<ChangeEvent>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    /// Deliver an event to all current subscribers, in arrival order.
    /// Returns how many subscribers it was queued for.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        debug!(kind = event.kind_str(), path = %event.path(), "broadcasting change");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber = id, "live session subscribed");
        Subscription {
            id,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One live session's ordered event queue.
pub struct Subscription {
    id: u64,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event for this subscriber; `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        match self.rx.recv().await {
            Ok(ev) => Some(LiveEvent::Change(ev)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(subscriber = self.id, skipped, "subscriber lagged; signaling resync");
                Some(LiveEvent::Resync)
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Raw receiver for stream adapters; lag must be mapped to a resync
    /// signal by the transport, same as [`Subscription::recv`] does.
    pub fn into_receiver(self) -> broadcast::Receiver<ChangeEvent> {
        self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotePath;

    fn ev(name: &str) -> ChangeEvent {
        ChangeEvent::Modified(NotePath::try_from(name).unwrap())
    }

    #[tokio::test]
    async fn subscribers_see_identical_ordered_sequences() {
        let hub = EventBroadcaster::new(16);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        for name in ["a.md", "b.md", "c.md"] {
            hub.publish(ev(name));
        }

        for expected in ["a.md", "b.md", "c.md"] {
            assert_eq!(a.recv().await, Some(LiveEvent::Change(ev(expected))));
            assert_eq!(b.recv().await, Some(LiveEvent::Change(ev(expected))));
        }
    }

    #[tokio::test]
    async fn no_replay_of_history_before_subscribe() {
        let hub = EventBroadcaster::new(16);
        {
            let _early = hub.subscribe();
            hub.publish(ev("before.md"));
        }

        let mut late = hub.subscribe();
        hub.publish(ev("after.md"));
        assert_eq!(late.recv().await, Some(LiveEvent::Change(ev("after.md"))));
    }

    #[tokio::test]
    async fn overflow_surfaces_as_resync_not_silent_loss() {
        let hub = EventBroadcaster::new(2);
        let mut slow = hub.subscribe();

        for i in 0..8 {
            hub.publish(ev(&format!("n{i}.md")));
        }

        assert_eq!(slow.recv().await, Some(LiveEvent::Resync));
        // After the resync signal the stream continues with retained events.
        assert!(matches!(slow.recv().await, Some(LiveEvent::Change(_))));
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_affect_peers() {
        let hub = EventBroadcaster::new(2);
        let _slow = hub.subscribe();
        let mut live = hub.subscribe();

        for i in 0..8 {
            hub.publish(ev(&format!("n{i}.md")));
        }
        // The fresh subscriber still lags (shared ring), but the producer
        // never blocked and this subscriber recovers via resync.
        assert_eq!(live.recv().await, Some(LiveEvent::Resync));
    }
}
