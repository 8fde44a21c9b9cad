//! Subscription registry and notification fan-out.
//!
//! One lock guards both maps (live senders and per-URI membership) so a
//! subscribe racing a detector tick can never observe half a state. Fan-out
//! snapshots the senders under the lock and pushes after releasing it,
//! without ever blocking on a subscriber.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use stagehand_wire::{Notification, ResourceUri};

/// Identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sender half of a connection's notification channel; the serving task owns
/// the receiver and interleaves pushes with request handling.
pub type NotificationSender = mpsc::Sender<Notification>;

#[derive(Default)]
struct Table {
    senders: HashMap<ConnId, NotificationSender>,
    topics: HashMap<ResourceUri, BTreeSet<ConnId>>,
}

/// URI → subscriber connections, plus the live-connection sender set.
///
/// Entries are created on first subscribe and pruned on unsubscribe or
/// disconnect; nothing is persisted.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Table>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection's notification channel.
    pub fn register(&self, conn: ConnId, sender: NotificationSender) {
        self.inner.lock().senders.insert(conn, sender);
    }

    /// Idempotently add `conn` to the set for `uri`, creating it if absent.
    pub fn subscribe(&self, uri: ResourceUri, conn: ConnId) {
        let mut table = self.inner.lock();
        table.topics.entry(uri).or_default().insert(conn);
    }

    /// Remove `conn` from the set for `uri` if present; drops the entry once
    /// empty.
    pub fn unsubscribe(&self, uri: &ResourceUri, conn: ConnId) {
        let mut table = self.inner.lock();
        if let Some(set) = table.topics.get_mut(uri) {
            set.remove(&conn);
            if set.is_empty() {
                table.topics.remove(uri);
            }
        }
    }

    /// Remove a connection from the live set and every subscription it
    /// belongs to. Called on disconnect and on failed delivery.
    pub fn drop_connection(&self, conn: ConnId) {
        let mut table = self.inner.lock();
        table.senders.remove(&conn);
        table.topics.retain(|_, set| {
            set.remove(&conn);
            !set.is_empty()
        });
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().senders.len()
    }

    /// Number of (uri, connection) subscription pairs.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().topics.values().map(BTreeSet::len).sum()
    }

    /// True if `conn` is subscribed to `uri`.
    pub fn is_subscribed(&self, uri: &ResourceUri, conn: ConnId) -> bool {
        self.inner
            .lock()
            .topics
            .get(uri)
            .is_some_and(|set| set.contains(&conn))
    }

    /// Deliver one notification to every subscriber of `uri`.
    ///
    /// Delivery never blocks the caller. A send to a closed channel means
    /// the serving task is gone; that connection is pruned everywhere. A
    /// full channel means the peer has stopped draining its queue; the
    /// notification is dropped for that subscriber only. Either way,
    /// delivery to the remaining subscribers is unaffected. Returns the
    /// number of deliveries.
    pub fn fan_out(&self, uri: &ResourceUri, note: &Notification) -> usize {
        let targets: Vec<(ConnId, NotificationSender)> = {
            let table = self.inner.lock();
            let Some(subscribers) = table.topics.get(uri) else {
                return 0;
            };
            subscribers
                .iter()
                .filter_map(|conn| table.senders.get(conn).map(|tx| (*conn, tx.clone())))
                .collect()
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (conn, sender) in targets {
            match sender.try_send(note.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(%conn, %uri, "notification queue full, dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(conn),
            }
        }
        for conn in gone {
            debug!(%conn, %uri, "pruning disconnected subscriber");
            self.drop_connection(conn);
        }
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use stagehand_wire::ResourceCategory;

    fn cube() -> ResourceUri {
        ResourceUri::new(ResourceCategory::Object, "Cube")
    }

    fn register_conn(registry: &SubscriptionRegistry) -> (ConnId, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = ConnId::new();
        registry.register(conn, tx);
        (conn, rx)
    }

    #[test]
    fn test_fan_out_reaches_each_subscriber_once() {
        let registry = SubscriptionRegistry::new();
        let (c1, mut rx1) = register_conn(&registry);
        let (c2, mut rx2) = register_conn(&registry);
        let (_c3, mut rx3) = register_conn(&registry);

        registry.subscribe(cube(), c1);
        registry.subscribe(cube(), c2);

        let note = Notification::resource_update(cube().to_string());
        let delivered = registry.fan_out(&cube(), &note);
        assert_eq!(delivered, 2);

        assert_eq!(rx1.try_recv().unwrap().uri(), "stage://object/Cube");
        assert!(rx1.try_recv().is_err(), "exactly one per subscriber");
        assert_eq!(rx2.try_recv().unwrap().uri(), "stage://object/Cube");
        assert!(rx3.try_recv().is_err(), "unsubscribed connection got one");
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = SubscriptionRegistry::new();
        let (c1, mut rx1) = register_conn(&registry);
        let (c2, mut rx2) = register_conn(&registry);

        registry.subscribe(cube(), c1);
        registry.subscribe(cube(), c2);
        registry.unsubscribe(&cube(), c1);

        let note = Notification::resource_update(cube().to_string());
        let delivered = registry.fan_out(&cube(), &note);
        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let (c1, mut rx1) = register_conn(&registry);

        registry.subscribe(cube(), c1);
        registry.subscribe(cube(), c1);
        assert_eq!(registry.subscription_count(), 1);

        let note = Notification::resource_update(cube().to_string());
        assert_eq!(registry.fan_out(&cube(), &note), 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_prunes_connection_everywhere() {
        let registry = SubscriptionRegistry::new();
        let (c1, rx1) = register_conn(&registry);
        let (c2, mut rx2) = register_conn(&registry);
        let lamp = ResourceUri::new(ResourceCategory::Light, "Key");

        registry.subscribe(cube(), c1);
        registry.subscribe(lamp.clone(), c1);
        registry.subscribe(cube(), c2);

        // Serving task gone: receiver dropped.
        drop(rx1);

        let note = Notification::resource_update(cube().to_string());
        let delivered = registry.fan_out(&cube(), &note);
        assert_eq!(delivered, 1);
        assert!(rx2.try_recv().is_ok());

        // c1 was pruned from the live set and from every topic, including
        // ones not involved in this fan-out.
        assert_eq!(registry.connection_count(), 1);
        assert!(!registry.is_subscribed(&lamp, c1));
    }

    #[tokio::test]
    async fn test_drop_connection_removes_all_memberships() {
        let registry = SubscriptionRegistry::new();
        let (c1, _rx1) = register_conn(&registry);
        let lamp = ResourceUri::new(ResourceCategory::Light, "Key");

        registry.subscribe(cube(), c1);
        registry.subscribe(lamp.clone(), c1);
        assert_eq!(registry.subscription_count(), 2);

        registry.drop_connection(c1);
        assert_eq!(registry.subscription_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_fan_out_without_subscribers_is_noop() {
        let registry = SubscriptionRegistry::new();
        let note = Notification::resource_update(cube().to_string());
        assert_eq!(registry.fan_out(&cube(), &note), 0);
    }

    #[test]
    fn test_full_channel_drops_update_without_stalling_others() {
        let registry = SubscriptionRegistry::new();
        let (slow, mut slow_rx) = {
            let (tx, rx) = mpsc::channel(1);
            let conn = ConnId::new();
            registry.register(conn, tx);
            (conn, rx)
        };
        let (fast, mut fast_rx) = register_conn(&registry);

        registry.subscribe(cube(), slow);
        registry.subscribe(cube(), fast);

        let note = Notification::resource_update(cube().to_string());
        // First fan-out fills the slow subscriber's capacity-1 queue.
        assert_eq!(registry.fan_out(&cube(), &note), 2);
        // Second fan-out must return, skip the full queue, and still reach
        // the other subscriber.
        assert_eq!(registry.fan_out(&cube(), &note), 1);
        assert_eq!(fast_rx.try_recv().unwrap().uri(), "stage://object/Cube");
        assert_eq!(fast_rx.try_recv().unwrap().uri(), "stage://object/Cube");

        // A full queue is not a disconnect: the slow subscriber keeps its
        // membership and its one queued notification.
        assert!(registry.is_subscribed(&cube(), slow));
        assert!(slow_rx.try_recv().is_ok());
        assert!(slow_rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_missing_is_harmless() {
        let registry = SubscriptionRegistry::new();
        registry.unsubscribe(&cube(), ConnId::new());
        assert_eq!(registry.subscription_count(), 0);
    }
}
