use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user: never carries the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
}

/// Full user record as returned by the profile and login endpoints.
/// The three relationship lists are projections of the relation table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub number: String,
    pub friends: Vec<Uuid>,
    pub friend_requests: Vec<Uuid>,
    pub sent_requests: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Outgoing pending request, as listed for the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRequest {
    pub to: Uuid,
    pub username: String,
}

/// Incoming pending request, as listed for the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedRequest {
    pub from: Uuid,
    pub username: String,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Uuid,
    pub text: String,
    pub time: DateTime<Utc>,
}
