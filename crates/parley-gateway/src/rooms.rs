use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use parley_types::PairKey;
use parley_types::events::GatewayEvent;

/// Handle to one connected gateway client. Cloning shares the same outbound
/// queue; the connection owns the matching receiver.
#[derive(Debug, Clone)]
pub struct Channel {
    id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl Channel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event for this client. Returns false once the client is gone.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Room registry: canonical pair key -> connected channels.
///
/// Built explicitly and passed around; every clone shares the same registry.
/// Membership is not persisted and nothing is queued for absent members.
#[derive(Clone)]
pub struct RoomRouter {
    inner: Arc<RwLock<Rooms>>,
    closed: Arc<watch::Sender<bool>>,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<PairKey, HashMap<Uuid, Channel>>,
    /// Reverse index: channel id -> rooms it joined
    joined: HashMap<Uuid, HashSet<PairKey>>,
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRouter {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::default(),
            closed: Arc::new(closed),
        }
    }

    /// Add `channel` to `room`. Joining twice is harmless; returns whether
    /// the channel was newly added.
    pub async fn join(&self, channel: &Channel, room: PairKey) -> bool {
        let mut rooms = self.inner.write().await;
        let added = rooms
            .members
            .entry(room)
            .or_default()
            .insert(channel.id, channel.clone())
            .is_none();
        rooms.joined.entry(channel.id).or_default().insert(room);
        added
    }

    /// Remove a channel from every room it joined. Rooms left empty are
    /// dropped. Returns the number of rooms the channel was in.
    pub async fn leave(&self, channel_id: Uuid) -> usize {
        let mut rooms = self.inner.write().await;
        let Some(keys) = rooms.joined.remove(&channel_id) else {
            return 0;
        };

        for key in &keys {
            if let Some(members) = rooms.members.get_mut(key) {
                members.remove(&channel_id);
                if members.is_empty() {
                    rooms.members.remove(key);
                }
            }
        }
        keys.len()
    }

    /// Deliver `event` to every channel in `room` except `exclude`.
    /// Returns how many channels accepted it.
    pub async fn publish(&self, room: &PairKey, event: GatewayEvent, exclude: Option<Uuid>) -> usize {
        let rooms = self.inner.read().await;
        let Some(members) = rooms.members.get(room) else {
            debug!("Publish to {} skipped: room is empty", room);
            return 0;
        };

        let delivered = members
            .values()
            .filter(|channel| Some(channel.id) != exclude)
            .filter(|channel| channel.send(event.clone()))
            .count();
        debug!("Published to {} ({} of {} channels)", room, delivered, members.len());
        delivered
    }

    pub async fn room_size(&self, room: &PairKey) -> usize {
        self.inner
            .read()
            .await
            .members
            .get(room)
            .map_or(0, HashMap::len)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.members.len()
    }

    /// Drop every room and channel handle and wake every connection
    /// waiting in [`closed`](Self::closed).
    pub async fn shutdown(&self) {
        self.closed.send_replace(true);
        let mut rooms = self.inner.write().await;
        rooms.members.clear();
        rooms.joined.clear();
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use parley_types::events::MessagePayload;

    use super::*;

    fn room() -> (PairKey, Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        (PairKey::new(a, b).unwrap(), a, b)
    }

    fn payload(room: PairKey, from: Uuid, to: Uuid, text: &str) -> GatewayEvent {
        GatewayEvent::ReceiveMessage(MessagePayload {
            room,
            id: None,
            sender: from,
            from,
            to,
            text: text.into(),
            time: Utc::now(),
            confirmed: false,
        })
    }

    fn text_of(event: GatewayEvent) -> String {
        match event {
            GatewayEvent::ReceiveMessage(p) => p.text,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_skips_excluded_channel() {
        let router = RoomRouter::new();
        let (key, a, b) = room();
        let (alice, mut alice_rx) = Channel::new();
        let (bob, mut bob_rx) = Channel::new();

        router.join(&alice, key).await;
        router.join(&bob, key).await;

        let reached = router.publish(&key, payload(key, a, b, "hi"), Some(alice.id())).await;
        assert_eq!(reached, 1);
        assert_eq!(text_of(bob_rx.try_recv().unwrap()), "hi");
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_is_scoped_to_the_room() {
        let router = RoomRouter::new();
        let (key, a, b) = room();
        let (other_key, _, _) = room();
        let (bob, mut bob_rx) = Channel::new();
        let (eve, mut eve_rx) = Channel::new();

        router.join(&bob, key).await;
        router.join(&eve, other_key).await;

        assert_eq!(router.publish(&key, payload(key, a, b, "hi"), None).await, 1);
        assert_eq!(text_of(bob_rx.try_recv().unwrap()), "hi");
        assert!(eve_rx.try_recv().is_err());

        let (empty_key, x, y) = room();
        assert_eq!(router.publish(&empty_key, payload(empty_key, x, y, "?"), None).await, 0);
    }

    #[tokio::test]
    async fn duplicate_join_delivers_once() {
        let router = RoomRouter::new();
        let (key, a, b) = room();
        let (bob, mut bob_rx) = Channel::new();

        assert!(router.join(&bob, key).await);
        assert!(!router.join(&bob, key).await);
        assert_eq!(router.room_size(&key).await, 1);

        router.publish(&key, payload(key, a, b, "once"), None).await;
        assert_eq!(text_of(bob_rx.try_recv().unwrap()), "once");
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_removes_channel_everywhere_and_drops_empty_rooms() {
        let router = RoomRouter::new();
        let (first, _, _) = room();
        let (second, _, _) = room();
        let (bob, _bob_rx) = Channel::new();
        let (carol, _carol_rx) = Channel::new();

        router.join(&bob, first).await;
        router.join(&bob, second).await;
        router.join(&carol, second).await;
        assert_eq!(router.room_count().await, 2);

        assert_eq!(router.leave(bob.id()).await, 2);
        assert_eq!(router.room_count().await, 1);
        assert_eq!(router.room_size(&first).await, 0);
        assert_eq!(router.room_size(&second).await, 1);

        // A second leave is a no-op.
        assert_eq!(router.leave(bob.id()).await, 0);
    }

    #[tokio::test]
    async fn closed_channels_are_not_counted() {
        let router = RoomRouter::new();
        let (key, a, b) = room();
        let (gone, gone_rx) = Channel::new();
        router.join(&gone, key).await;
        drop(gone_rx);

        assert_eq!(router.publish(&key, payload(key, a, b, "hi"), None).await, 0);
    }

    #[tokio::test]
    async fn routers_are_isolated_and_shut_down_cleanly() {
        let first = RoomRouter::new();
        let second = RoomRouter::new();
        let (key, _, _) = room();
        let (bob, _bob_rx) = Channel::new();

        first.join(&bob, key).await;
        assert_eq!(second.room_size(&key).await, 0);

        first.shutdown().await;
        assert_eq!(first.room_count().await, 0);
        assert_eq!(first.leave(bob.id()).await, 0);
    }

    #[tokio::test]
    async fn shutdown_wakes_connections_waiting_on_close() {
        let router = RoomRouter::new();
        let waiter = tokio::spawn({
            let router = router.clone();
            async move { router.closed().await }
        });

        router.shutdown().await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Late waiters return at once.
        router.closed().await;
    }
}
