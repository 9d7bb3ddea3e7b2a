// ── Event dispatch ──
//
// Called by the receive loop once per decoded event, in wire order.
// Replies go to the correlator first and only reach the entity listener
// when the codec marked them as doubling as a status push. Every status
// event is mirrored onto the observer broadcast, routed or not.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::correlator::Correlator;
use crate::model::{Event, EventClass};
use crate::registry::Registry;

/// Snapshot of dispatch counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    /// Events handed to an entity listener.
    pub delivered: u64,
    /// Status events for keys with no listener attached.
    pub unrouted: u64,
    /// Replies that resolved a pending request.
    pub replies_matched: u64,
    /// Replies nobody was waiting for (late, or never requested).
    pub replies_dropped: u64,
}

#[derive(Debug, Default)]
struct DispatchStats {
    delivered: AtomicU64,
    unrouted: AtomicU64,
    replies_matched: AtomicU64,
    replies_dropped: AtomicU64,
}

/// Routes decoded events to the correlator, listeners and observers.
pub struct Dispatcher<P> {
    registry: Arc<Registry<P>>,
    correlator: Arc<Correlator<P>>,
    observers: broadcast::Sender<Arc<Event<P>>>,
    stats: DispatchStats,
}

impl<P: Send + Sync + 'static> Dispatcher<P> {
    pub fn new(
        registry: Arc<Registry<P>>,
        correlator: Arc<Correlator<P>>,
        observers: broadcast::Sender<Arc<Event<P>>>,
    ) -> Self {
        Self {
            registry,
            correlator,
            observers,
            stats: DispatchStats::default(),
        }
    }

    pub fn dispatch(&self, event: Event<P>) {
        let event = Arc::new(event);

        if let EventClass::Reply {
            request,
            also_status,
        } = &event.class
        {
            if self.correlator.resolve(request, Arc::clone(&event)) {
                self.stats.replies_matched.fetch_add(1, Ordering::Relaxed);
                trace!(key = %event.key, %request, "reply matched");
            } else {
                self.stats.replies_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(key = %event.key, %request, "reply with no pending request dropped");
            }
            if !*also_status {
                return;
            }
        }

        self.deliver(event);
    }

    fn deliver(&self, event: Arc<Event<P>>) {
        match self.registry.lookup(&event.key) {
            Some(listener) => {
                listener.on_event(&event);
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.stats.unrouted.fetch_add(1, Ordering::Relaxed);
                debug!(key = %event.key, "no listener registered, event dropped");
            }
        }

        // No observers is fine.
        let _ = self.observers.send(event);
    }

    pub fn counts(&self) -> DispatchCounts {
        DispatchCounts {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            unrouted: self.stats.unrouted.load(Ordering::Relaxed),
            replies_matched: self.stats.replies_matched.load(Ordering::Relaxed),
            replies_dropped: self.stats.replies_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{EntityKey, EntityKind, RequestKey};
    use crate::registry::EntityListener;

    struct Harness {
        dispatcher: Dispatcher<u32>,
        registry: Arc<Registry<u32>>,
        correlator: Arc<Correlator<u32>>,
        seen: Arc<Mutex<Vec<(String, u32)>>>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(Registry::new());
        let correlator = Arc::new(Correlator::new());
        let (tx, _) = broadcast::channel(16);
        Harness {
            dispatcher: Dispatcher::new(Arc::clone(&registry), Arc::clone(&correlator), tx),
            registry,
            correlator,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    impl Harness {
        fn listen(&self, key: EntityKey) {
            let seen = Arc::clone(&self.seen);
            let listener: Arc<dyn EntityListener<u32>> = Arc::new(move |e: &Event<u32>| {
                seen.lock().unwrap().push((e.key.to_string(), e.payload));
            });
            self.registry.register(key, listener);
        }

        fn seen(&self) -> Vec<(String, u32)> {
            self.seen.lock().unwrap().clone()
        }
    }

    fn zone(n: u32) -> EntityKey {
        EntityKey::new(EntityKind::Zone, n)
    }

    #[test]
    fn unsolicited_events_reach_listener_in_order() {
        let h = harness();
        h.listen(zone(1));
        h.listen(zone(2));

        for (n, payload) in [(1, 10), (2, 20), (1, 11), (1, 12), (2, 21)] {
            h.dispatcher.dispatch(Event::unsolicited(zone(n), payload));
        }

        assert_eq!(
            h.seen(),
            vec![
                ("zone:1".into(), 10),
                ("zone:2".into(), 20),
                ("zone:1".into(), 11),
                ("zone:1".into(), 12),
                ("zone:2".into(), 21),
            ]
        );
        assert_eq!(h.dispatcher.counts().delivered, 5);
    }

    #[test]
    fn unregistered_key_is_dropped_not_an_error() {
        let h = harness();
        h.dispatcher.dispatch(Event::unsolicited(zone(9), 1));
        assert!(h.seen().is_empty());
        assert_eq!(h.dispatcher.counts().unrouted, 1);
    }

    #[tokio::test]
    async fn reply_only_resolves_request() {
        let h = harness();
        h.listen(zone(3));
        let request = RequestKey::Entity(zone(3));
        let ticket = h.correlator.begin(request.clone(), Duration::from_secs(5)).unwrap();

        h.dispatcher
            .dispatch(Event::reply(zone(3), request, false, 33));

        assert_eq!(ticket.wait().await.unwrap().payload, 33);
        assert!(h.seen().is_empty());
        assert_eq!(h.dispatcher.counts().replies_matched, 1);
    }

    #[tokio::test]
    async fn status_reply_reaches_both() {
        let h = harness();
        h.listen(zone(4));
        let request = RequestKey::Id(77);
        let ticket = h.correlator.begin(request.clone(), Duration::from_secs(5)).unwrap();

        h.dispatcher.dispatch(Event::reply(zone(4), request, true, 44));

        assert_eq!(ticket.wait().await.unwrap().payload, 44);
        assert_eq!(h.seen(), vec![("zone:4".into(), 44)]);
    }

    #[test]
    fn unmatched_reply_is_dropped() {
        let h = harness();
        h.listen(zone(5));
        h.dispatcher
            .dispatch(Event::reply(zone(5), RequestKey::Entity(zone(5)), false, 1));

        assert!(h.seen().is_empty());
        assert_eq!(h.dispatcher.counts().replies_dropped, 1);
    }

    #[test]
    fn observers_see_delivered_events() {
        let h = harness();
        let mut rx = h.dispatcher.observers.subscribe();
        h.dispatcher.dispatch(Event::unsolicited(zone(6), 6));

        let seen = rx.try_recv().unwrap();
        assert_eq!(seen.key, zone(6));
    }
}
