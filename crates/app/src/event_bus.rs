//! In-process event bus.
//!
//! Handlers subscribe per [`EventKind`]. Publishing snapshots the current
//! subscriber list and spawns one tokio task per handler, so `publish`
//! returns immediately, every handler sees the same event value, and a
//! panicking handler only takes down its own task.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};

use lumen_domain::event::{Event, EventKind};

use crate::lock;

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// Fire-and-forget publish/subscribe hub. Cloning shares the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = lock(&self.registry);
        let subscribers: usize = registry.handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("subscribers", &subscribers)
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handler for `kind`.
    pub fn subscribe<F, Fut>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.register(kind, handler)
    }

    /// Register a synchronous handler for `kind`. It still runs in its own task.
    pub fn subscribe_sync<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let handler: Handler = Arc::new(move |event| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(&event) })
        });
        self.register(kind, handler)
    }

    fn register(&self, kind: EventKind, handler: Handler) -> Subscription {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.entry(kind).or_default().push((id, handler));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Deliver `event` to every current subscriber of its kind.
    ///
    /// Must be called from within a tokio runtime; outside of one the event
    /// is dropped with a warning.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let handlers: Vec<Handler> = lock(&self.registry)
            .handlers
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(%kind, "event published without subscribers");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%kind, "no async runtime available, dropping event");
            return;
        };

        tracing::debug!(%kind, subscribers = handlers.len(), "publishing event");
        for handler in handlers {
            let event = event.clone();
            runtime.spawn(async move { handler(event).await });
        }
    }

    /// Number of live subscriptions for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.registry)
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping it keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Remove the handler. Deliveries already spawned still run.
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        if let Some(entries) = registry.handlers.get_mut(&self.kind) {
            entries.retain(|(id, _)| *id != self.id);
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_domain::id::ZoneId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn expired(zone: &str) -> Event {
        Event::timer_expired(ZoneId::new(zone).unwrap())
    }

    #[tokio::test]
    async fn should_deliver_event_to_every_subscriber_of_its_kind() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in ["first", "second"] {
            let tx = tx.clone();
            bus.subscribe(EventKind::TimerExpired, move |event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((name, event));
                }
            });
        }

        bus.publish(expired("kitchen"));

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort_by_key(|(name, _)| *name);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        assert_eq!(seen[0].1, expired("kitchen"));
    }

    #[tokio::test]
    async fn should_not_deliver_other_kinds() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe_sync(EventKind::ManualDetected, move |event| {
            let _ = tx.send(event.clone());
        });

        bus.publish(expired("kitchen"));
        bus.publish(Event::manual_detected(ZoneId::new("hall").unwrap()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), EventKind::ManualDetected);
    }

    #[tokio::test]
    async fn should_return_before_handlers_complete() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.subscribe_sync(EventKind::TimerExpired, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(expired("kitchen"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_keep_delivering_after_a_handler_panics() {
        let bus = EventBus::new();
        bus.subscribe_sync(EventKind::TimerExpired, |_| panic!("handler failure"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe_sync(EventKind::TimerExpired, move |event| {
            let _ = tx.send(event.clone());
        });

        bus.publish(expired("a"));
        bus.publish(expired("b"));

        assert_eq!(rx.recv().await.unwrap(), expired("a"));
        assert_eq!(rx.recv().await.unwrap(), expired("b"));
    }

    #[tokio::test]
    async fn should_stop_delivering_after_unsubscribe() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = bus.subscribe_sync(EventKind::TimerExpired, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscriber_count(EventKind::TimerExpired), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(bus.subscriber_count(EventKind::TimerExpired), 0);

        bus.publish(expired("kitchen"));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn should_complete_in_flight_delivery_when_unsubscribed_mid_publish() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = bus.subscribe_sync(EventKind::TimerExpired, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(expired("kitchen"));
        subscription.unsubscribe();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_drop_event_outside_of_a_runtime() {
        let bus = EventBus::new();
        bus.subscribe_sync(EventKind::TimerExpired, |_| {});
        bus.publish(expired("kitchen"));
    }
}
