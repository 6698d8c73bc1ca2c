//! Transport adapter: the set of live connections and their outbound queues.
//!
//! The session handler and broadcaster only see the [`Transport`] trait;
//! [`ConnectionTable`] is the production implementation backed by one
//! bounded `mpsc` queue per WebSocket connection. Online counts bypass the
//! queue: each connection has a `watch` slot holding the latest count, so a
//! full queue can delay a count but never lose it.

pub mod websocket;

use chat_core::{ConnectionId, ServerEvent};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Fire-and-forget delivery of outbound events.
///
/// Implementations must not block. They may skip recipients that are gone;
/// the latest online count must still reach every live connection.
pub trait Transport: Send + Sync {
    /// Deliver to exactly one connection.
    fn send_to(&self, id: ConnectionId, event: ServerEvent);

    /// Deliver to every connection, optionally skipping one.
    fn send_to_all(&self, event: &ServerEvent, exclude: Option<ConnectionId>);
}

/// Sending half of one connection's outbound path.
struct Outlet {
    events: mpsc::Sender<ServerEvent>,
    online: watch::Sender<usize>,
}

impl Outlet {
    fn deliver(&self, id: ConnectionId, event: ServerEvent) {
        if let ServerEvent::OnlineCount { count } = event {
            self.online.send_replace(count);
            return;
        }
        if let Err(e) = self.events.try_send(event) {
            trace!(conn = %id, error = %e, "dropped outbound event");
        }
    }
}

/// Receiving half of one connection's outbound path.
pub struct Outbound {
    /// Everything except online counts, in send order.
    pub events: mpsc::Receiver<ServerEvent>,
    /// Latest online count; marked changed on every publication.
    pub online: watch::Receiver<usize>,
}

/// Live connections, keyed by id.
pub struct ConnectionTable {
    outlets: DashMap<ConnectionId, Outlet>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ConnectionTable {
    /// Create a table whose per-connection queues hold `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            outlets: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Allocate a fresh id and outbound path for an accepted connection.
    pub fn register(&self) -> (ConnectionId, Outbound) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let (online_tx, online_rx) = watch::channel(0);
        self.outlets.insert(
            id,
            Outlet {
                events: events_tx,
                online: online_tx,
            },
        );
        debug!(conn = %id, total = self.outlets.len(), "connection registered");
        (
            id,
            Outbound {
                events: events_rx,
                online: online_rx,
            },
        )
    }

    /// Drop a connection's outbound path. Later sends to it are skipped.
    pub fn unregister(&self, id: ConnectionId) {
        if self.outlets.remove(&id).is_some() {
            debug!(conn = %id, total = self.outlets.len(), "connection unregistered");
        }
    }

    /// Number of live connections, joined or not.
    pub fn len(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }
}

impl Transport for ConnectionTable {
    fn send_to(&self, id: ConnectionId, event: ServerEvent) {
        match self.outlets.get(&id) {
            Some(outlet) => outlet.deliver(id, event),
            None => trace!(conn = %id, "send to unknown connection skipped"),
        }
    }

    fn send_to_all(&self, event: &ServerEvent, exclude: Option<ConnectionId>) {
        for entry in self.outlets.iter() {
            if Some(*entry.key()) == exclude {
                continue;
            }
            entry.value().deliver(*entry.key(), event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(text: &str) -> ServerEvent {
        ServerEvent::ErrorMessage(text.to_string())
    }

    #[tokio::test]
    async fn ids_are_unique_and_monotonic() {
        let table = ConnectionTable::new(4);
        assert!(table.is_empty());
        let (a, _ra) = table.register();
        let (b, _rb) = table.register();
        assert!(b > a);
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
    }

    #[tokio::test]
    async fn send_to_all_honours_exclusion() {
        let table = ConnectionTable::new(4);
        let (a, mut ra) = table.register();
        let (_b, mut rb) = table.register();

        table.send_to_all(&notice("hello"), Some(a));
        table.send_to_all(&ServerEvent::OnlineCount { count: 1 }, Some(a));

        assert!(ra.events.try_recv().is_err());
        assert!(!ra.online.has_changed().unwrap());
        assert_eq!(rb.events.try_recv().unwrap(), notice("hello"));
        assert!(rb.online.has_changed().unwrap());
        assert_eq!(*rb.online.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let table = ConnectionTable::new(1);
        let (a, mut ra) = table.register();

        table.send_to(a, notice("first"));
        table.send_to(a, notice("second"));

        assert_eq!(ra.events.try_recv().unwrap(), notice("first"));
        assert!(ra.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn stalled_reader_still_sees_latest_count() {
        let table = ConnectionTable::new(2);
        let (slow, mut rx) = table.register();

        // The reader never drains, so its event queue fills up.
        for n in 1..=3 {
            table.send_to_all(&notice(&format!("msg {n}")), None);
            table.send_to_all(&ServerEvent::OnlineCount { count: n }, None);
        }
        table.send_to(slow, notice("one more"));

        assert!(rx.online.has_changed().unwrap());
        assert_eq!(*rx.online.borrow_and_update(), 3);
        assert_eq!(rx.events.try_recv().unwrap(), notice("msg 1"));
        assert_eq!(rx.events.try_recv().unwrap(), notice("msg 2"));
        assert!(rx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregistered_connection_is_skipped() {
        let table = ConnectionTable::new(4);
        let (a, mut ra) = table.register();
        table.unregister(a);

        table.send_to(a, notice("gone"));
        table.send_to_all(&ServerEvent::OnlineCount { count: 0 }, None);

        assert!(ra.events.try_recv().is_err());
        assert!(ra.online.has_changed().is_err());
        assert!(table.is_empty());
    }
}
