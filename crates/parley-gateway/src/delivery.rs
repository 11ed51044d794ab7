use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use parley_db::{Database, StoreError};
use parley_types::PairKey;
use parley_types::events::{GatewayEvent, MessagePayload};
use parley_types::models::Message;

use crate::rooms::RoomRouter;

/// Ordering of the realtime push and the persistence write for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Push first (unconfirmed), then persist. Peers may see a message that
    /// later fails to persist.
    Eager,
    /// Persist first, then push the stored message. Nothing is pushed if the
    /// write fails.
    #[default]
    Confirmed,
}

#[derive(Debug, Error)]
#[error("unknown delivery mode '{0}' (expected 'eager' or 'confirmed')")]
pub struct UnknownDeliveryMode(String);

impl FromStr for DeliveryMode {
    type Err = UnknownDeliveryMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(Self::Eager),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(UnknownDeliveryMode(other.to_string())),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager => f.write_str("eager"),
            Self::Confirmed => f.write_str("confirmed"),
        }
    }
}

/// Outcome of a successful delivery.
#[derive(Debug)]
pub struct Delivery {
    pub message: Message,
    pub room: PairKey,
    /// Channels the realtime push reached
    pub reached: usize,
}

/// Sends one chat message down both paths: the room broadcast and the
/// thread store.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    db: Arc<Database>,
    router: RoomRouter,
    mode: DeliveryMode,
}

impl DeliveryCoordinator {
    pub fn new(db: Arc<Database>, router: RoomRouter, mode: DeliveryMode) -> Self {
        Self { db, router, mode }
    }

    pub fn router(&self) -> &RoomRouter {
        &self.router
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Deliver `text` from `sender` to `recipient`. `exclude` is the sending
    /// gateway channel, if the message came in over the gateway.
    pub async fn deliver(
        &self,
        sender: Uuid,
        recipient: Uuid,
        text: &str,
        exclude: Option<Uuid>,
    ) -> Result<Delivery, StoreError> {
        if text.trim().is_empty() {
            return Err(StoreError::validation("text", "Message text is required"));
        }
        let room = PairKey::new(sender, recipient)?;

        match self.mode {
            DeliveryMode::Eager => {
                let event = GatewayEvent::ReceiveMessage(MessagePayload {
                    room,
                    id: None,
                    sender,
                    from: sender,
                    to: recipient,
                    text: text.to_string(),
                    time: Utc::now(),
                    confirmed: false,
                });
                let reached = self.router.publish(&room, event, exclude).await;

                let message = self.persist(room, sender, text).await.inspect_err(|e| {
                    error!(
                        "Message from {} in {} pushed to {} channel(s) but not persisted: {}",
                        sender, room, reached, e
                    );
                })?;

                Ok(Delivery {
                    message,
                    room,
                    reached,
                })
            }
            DeliveryMode::Confirmed => {
                let message = self.persist(room, sender, text).await?;

                let event = GatewayEvent::ReceiveMessage(MessagePayload {
                    room,
                    id: Some(message.id),
                    sender,
                    from: sender,
                    to: recipient,
                    text: message.text.clone(),
                    time: message.time,
                    confirmed: true,
                });
                let reached = self.router.publish(&room, event, exclude).await;
                debug!("Message {} delivered to {} channel(s)", message.id, reached);

                Ok(Delivery {
                    message,
                    room,
                    reached,
                })
            }
        }
    }

    async fn persist(&self, room: PairKey, sender: Uuid, text: &str) -> Result<Message, StoreError> {
        let db = self.db.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || db.append_message(&room, sender, &text))
            .await
            .map_err(|e| StoreError::Storage(format!("spawn_blocking join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::Channel;

    struct Fixture {
        db: Arc<Database>,
        router: RoomRouter,
        alice: Uuid,
        bob: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.create_user(alice, "alice1", "hash", "1111111111").unwrap();
        db.create_user(bob, "bob12", "hash", "2222222222").unwrap();
        Fixture {
            db,
            router: RoomRouter::new(),
            alice,
            bob,
        }
    }

    fn payload(event: GatewayEvent) -> MessagePayload {
        match event {
            GatewayEvent::ReceiveMessage(p) => p,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirmed_mode_persists_then_pushes() {
        let f = fixture();
        let coordinator = DeliveryCoordinator::new(f.db.clone(), f.router.clone(), DeliveryMode::Confirmed);
        let room = PairKey::new(f.alice, f.bob).unwrap();
        let (bob_channel, mut bob_rx) = Channel::new();
        f.router.join(&bob_channel, room).await;

        let delivery = coordinator.deliver(f.alice, f.bob, "hi", None).await.unwrap();
        assert_eq!(delivery.reached, 1);

        let pushed = payload(bob_rx.try_recv().unwrap());
        assert!(pushed.confirmed);
        assert_eq!(pushed.id, Some(delivery.message.id));
        assert_eq!(pushed.text, "hi");
        assert_eq!(pushed.from, f.alice);
        assert_eq!(pushed.to, f.bob);
        assert_eq!(pushed.time, delivery.message.time);

        let stored = f.db.read_thread(f.bob, f.alice).unwrap();
        assert_eq!(stored, vec![delivery.message]);
    }

    #[tokio::test]
    async fn eager_mode_pushes_unconfirmed_and_persists() {
        let f = fixture();
        let coordinator = DeliveryCoordinator::new(f.db.clone(), f.router.clone(), DeliveryMode::Eager);
        let room = PairKey::new(f.alice, f.bob).unwrap();
        let (bob_channel, mut bob_rx) = Channel::new();
        f.router.join(&bob_channel, room).await;

        coordinator.deliver(f.alice, f.bob, "hi", None).await.unwrap();

        let pushed = payload(bob_rx.try_recv().unwrap());
        assert!(!pushed.confirmed);
        assert!(pushed.id.is_none());
        assert_eq!(pushed.text, "hi");
        assert_eq!(f.db.read_thread(f.alice, f.bob).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_recipient_still_gets_persisted_message() {
        let f = fixture();
        let coordinator = DeliveryCoordinator::new(f.db.clone(), f.router.clone(), DeliveryMode::Confirmed);

        let delivery = coordinator.deliver(f.alice, f.bob, "later", None).await.unwrap();
        assert_eq!(delivery.reached, 0);
        assert_eq!(f.db.read_thread(f.bob, f.alice).unwrap()[0].text, "later");
    }

    #[tokio::test]
    async fn sending_channel_is_excluded() {
        let f = fixture();
        let coordinator = DeliveryCoordinator::new(f.db.clone(), f.router.clone(), DeliveryMode::Confirmed);
        let room = PairKey::new(f.alice, f.bob).unwrap();
        let (alice_channel, mut alice_rx) = Channel::new();
        let (bob_channel, mut bob_rx) = Channel::new();
        f.router.join(&alice_channel, room).await;
        f.router.join(&bob_channel, room).await;

        coordinator
            .deliver(f.alice, f.bob, "hi", Some(alice_channel.id()))
            .await
            .unwrap();
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(payload(bob_rx.try_recv().unwrap()).text, "hi");
    }

    #[tokio::test]
    async fn eager_push_survives_failed_write() {
        let f = fixture();
        let ghost = Uuid::new_v4();
        let room = PairKey::new(f.alice, ghost).unwrap();
        let (listener, mut listener_rx) = Channel::new();
        f.router.join(&listener, room).await;

        let eager = DeliveryCoordinator::new(f.db.clone(), f.router.clone(), DeliveryMode::Eager);
        let err = eager.deliver(f.alice, ghost, "lost", None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        // The push already went out and is not retracted.
        assert_eq!(payload(listener_rx.try_recv().unwrap()).text, "lost");

        let confirmed = DeliveryCoordinator::new(f.db.clone(), f.router.clone(), DeliveryMode::Confirmed);
        assert!(confirmed.deliver(f.alice, ghost, "kept back", None).await.is_err());
        assert!(listener_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_push() {
        let f = fixture();
        let coordinator = DeliveryCoordinator::new(f.db.clone(), f.router.clone(), DeliveryMode::Eager);
        let room = PairKey::new(f.alice, f.bob).unwrap();
        let (bob_channel, mut bob_rx) = Channel::new();
        f.router.join(&bob_channel, room).await;

        let err = coordinator.deliver(f.alice, f.bob, "  ", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("eager".parse::<DeliveryMode>().unwrap(), DeliveryMode::Eager);
        assert_eq!(" Confirmed ".parse::<DeliveryMode>().unwrap(), DeliveryMode::Confirmed);
        assert!("sometimes".parse::<DeliveryMode>().is_err());
        assert_eq!(DeliveryMode::default(), DeliveryMode::Confirmed);
    }
}
