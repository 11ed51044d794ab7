use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, UserProfile};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway identify step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

/// Fields default to empty so missing ones are reported as validation
/// errors instead of a generic deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}

// -- Friend requests --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFriendRequest {
    #[serde(default)]
    pub to_username: String,
}

/// Body of accept/reject: the id of the user who sent the request.
#[derive(Debug, Deserialize)]
pub struct RespondFriendRequest {
    pub from: Option<Uuid>,
}

// -- Chat --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: String,
    /// The stored message. Absent only when persistence was skipped.
    pub data: Option<Message>,
}

// -- Bot --

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub reply: String,
}

// -- Generic --

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
