//! Listener registry with disposable subscription handles

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::events::{EventKind, ServerEvent};

struct Listener {
    kind: EventKind,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

/// Fan-out of inbound events to subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind`. Dropping the handle unregisters it.
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = reg.next_id;
        reg.next_id += 1;
        reg.listeners.insert(id, Listener { kind, tx });
        tracing::debug!("Listener {} registered for {:?}", id, kind);

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every matching listener. Returns the delivery count.
    pub fn publish(&self, event: &ServerEvent) -> usize {
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;
        reg.listeners.retain(|_, listener| {
            if !listener.kind.matches(event) {
                return true;
            }
            match listener.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                // Receiver gone without running Drop (leaked); prune it.
                Err(_) => false,
            }
        });
        delivered
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .len()
    }
}

/// Handle to a registered listener.
///
/// Yields matching events via `recv()` or as a `Stream`. Unregisters on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    /// Next already-queued event, without waiting.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }

    /// Explicitly unregister. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut reg = registry.lock().unwrap_or_else(|e| e.into_inner());
            reg.listeners.remove(&self.id);
            tracing::debug!("Listener {} unregistered", self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = ServerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::UnreadCountUpdate;
    use futures::StreamExt;

    fn unread(room_id: i64, count: u32) -> ServerEvent {
        ServerEvent::UnreadCountUpdate(UnreadCountUpdate {
            room_id,
            unread_count: count,
        })
    }

    #[test]
    fn test_publish_filters_by_kind() {
        let bus = EventBus::new();
        let mut unread_sub = bus.subscribe(EventKind::UnreadCountUpdate);
        let mut conn_sub = bus.subscribe(EventKind::Connection);
        let mut all_sub = bus.subscribe(EventKind::All);

        assert_eq!(bus.publish(&unread(5, 3)), 2);
        assert_eq!(unread_sub.try_recv(), Some(unread(5, 3)));
        assert_eq!(all_sub.try_recv(), Some(unread(5, 3)));
        assert_eq!(conn_sub.try_recv(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::All);
        let other = bus.subscribe(EventKind::All);
        assert_eq!(bus.listener_count(), 2);

        drop(sub);
        assert_eq!(bus.listener_count(), 1);
        other.unsubscribe();
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.publish(&ServerEvent::Connected), 0);
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventKind::All);
        bus.publish(&ServerEvent::Connected);
        drop(bus);

        // Queued events remain readable; then the stream ends.
        assert_eq!(sub.try_recv(), Some(ServerEvent::Connected));
        assert_eq!(tokio_test::block_on(sub.recv()), None);
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::UnreadCountUpdate);
        bus.publish(&unread(1, 1));
        bus.publish(&ServerEvent::Connected);
        bus.publish(&unread(1, 2));
        drop(bus);

        let got: Vec<ServerEvent> = sub.collect().await;
        assert_eq!(got, vec![unread(1, 1), unread(1, 2)]);
    }
}
