use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Events carried by an [`EventBus`] are grouped by kind.
pub trait BusEvent: Clone + Send + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

struct Subscriber<E: BusEvent> {
    kinds: HashSet<E::Kind>,
    tx: mpsc::UnboundedSender<E>,
}

/// Events published before any subscriber of their kind attached.
struct Cache<E: BusEvent> {
    backlog: VecDeque<E>,
    claimed: HashSet<E::Kind>,
}

struct BusInner<E: BusEvent> {
    subscribers: DashMap<u64, Subscriber<E>>,
    cache: Mutex<Cache<E>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<E: BusEvent> BusInner<E> {
    fn cache(&self) -> MutexGuard<'_, Cache<E>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Typed publish/subscribe with per-kind caching.
pub struct EventBus<E: BusEvent> {
    inner: Arc<BusInner<E>>,
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: BusEvent> EventBus<E> {
    /// `capacity` bounds the backlog of unclaimed events; the oldest is dropped first.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: DashMap::new(),
                cache: Mutex::new(Cache {
                    backlog: VecDeque::new(),
                    claimed: HashSet::new(),
                }),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn publish(&self, event: E) {
        let kind = event.kind();
        // Held for the whole publish so a concurrent subscribe sees either the
        // backlog entry or the live delivery, never neither.
        let mut cache = self.inner.cache();

        let mut delivered = false;
        let mut closed = Vec::new();
        for entry in self.inner.subscribers.iter() {
            if !entry.value().kinds.contains(&kind) {
                continue;
            }
            if entry.value().tx.send(event.clone()).is_ok() {
                delivered = true;
            } else {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            self.inner.subscribers.remove(&id);
        }

        if delivered || cache.claimed.contains(&kind) {
            return;
        }
        cache.backlog.push_back(event);
        if cache.backlog.len() > self.inner.capacity {
            cache.backlog.pop_front();
            tracing::warn!(capacity = self.inner.capacity, "event backlog full, dropped oldest event");
        }
    }

    /// Subscribe to `kinds`. Cached events of a kind are replayed to the
    /// first subscriber of that kind, in publish order.
    pub fn subscribe(&self, kinds: &[E::Kind]) -> Subscription<E> {
        let kinds: HashSet<E::Kind> = kinds.iter().copied().collect();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut cache = self.inner.cache();
        let mut kept = VecDeque::with_capacity(cache.backlog.len());
        for event in cache.backlog.drain(..) {
            if kinds.contains(&event.kind()) {
                let _ = tx.send(event);
            } else {
                kept.push_back(event);
            }
        }
        cache.backlog = kept;
        cache.claimed.extend(kinds.iter().copied());

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(id, Subscriber { kinds, tx });
        drop(cache);

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Drop every subscriber. Their receivers drain what was already queued.
    pub fn unsubscribe_all(&self) {
        self.inner.subscribers.clear();
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription<E: BusEvent> {
    id: u64,
    rx: mpsc::UnboundedReceiver<E>,
    bus: Weak<BusInner<E>>,
}

impl<E: BusEvent> Subscription<E> {
    /// Next event, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E: BusEvent> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        A(u32),
        B(u32),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum K {
        A,
        B,
    }

    impl BusEvent for Ev {
        type Kind = K;
        fn kind(&self) -> K {
            match self {
                Ev::A(_) => K::A,
                Ev::B(_) => K::B,
            }
        }
    }

    #[test]
    fn first_subscriber_gets_cached_events_of_its_kind() {
        let bus = EventBus::new(16);
        bus.publish(Ev::A(1));
        bus.publish(Ev::B(2));
        bus.publish(Ev::A(3));

        let mut a = bus.subscribe(&[K::A]);
        assert_eq!(a.try_recv(), Some(Ev::A(1)));
        assert_eq!(a.try_recv(), Some(Ev::A(3)));
        assert_eq!(a.try_recv(), None);

        let mut b = bus.subscribe(&[K::B]);
        assert_eq!(b.try_recv(), Some(Ev::B(2)));
    }

    #[test]
    fn later_subscribers_only_see_live_events() {
        let bus = EventBus::new(16);
        bus.publish(Ev::A(1));
        let mut first = bus.subscribe(&[K::A]);
        let mut second = bus.subscribe(&[K::A]);
        bus.publish(Ev::A(2));

        assert_eq!(first.try_recv(), Some(Ev::A(1)));
        assert_eq!(first.try_recv(), Some(Ev::A(2)));
        assert_eq!(second.try_recv(), Some(Ev::A(2)));
        assert_eq!(second.try_recv(), None);
    }

    #[test]
    fn backlog_is_bounded() {
        let bus = EventBus::new(2);
        for i in 0..4 {
            bus.publish(Ev::A(i));
        }
        let mut a = bus.subscribe(&[K::A]);
        assert_eq!(a.try_recv(), Some(Ev::A(2)));
        assert_eq!(a.try_recv(), Some(Ev::A(3)));
        assert_eq!(a.try_recv(), None);
    }

    #[tokio::test]
    async fn unsubscribe_all_closes_receivers() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe(&[K::A]);
        bus.publish(Ev::A(7));
        bus.unsubscribe_all();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(a.recv().await, Some(Ev::A(7)));
        assert_eq!(a.recv().await, None);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus: EventBus<Ev> = EventBus::new(4);
        let sub = bus.subscribe(&[K::A, K::B]);
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
