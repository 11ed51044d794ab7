use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pair::PairKey;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A peer sent a message to a room this connection joined
    ReceiveMessage(MessagePayload),

    /// A command from this connection was refused
    Error { message: String },
}

/// Realtime copy of a chat message.
///
/// `confirmed` is true when the message was persisted before it was pushed;
/// unconfirmed payloads carry no id and may not survive a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub room: PairKey,
    pub id: Option<Uuid>,
    pub sender: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub text: String,
    pub time: DateTime<Utc>,
    pub confirmed: bool,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Join the room for a conversation; `room` is the canonical pair key
    JoinRoom { room: String },

    /// Send a chat message to the other member of `room`
    SendMessage {
        room: String,
        message: String,
        /// Informational only: the identified user is always the sender.
        #[serde(default)]
        sender: Option<Uuid>,
    },
}
