//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the parley-types API models.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use parley_types::models::{Message, UserSummary};

use crate::error::{Result, StoreError};

pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub number: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

pub struct ThreadRow {
    pub id: Uuid,
    pub pair_key: String,
    pub created_at: DateTime<Utc>,
}

pub struct MessageRow {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub time: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: parse_uuid(&self.id, "message id")?,
            sender: parse_uuid(&self.sender, "message sender")?,
            text: self.text,
            time: parse_time(&self.time, "message time")?,
        })
    }
}

/// Timestamps are stored as fixed-width RFC 3339 strings so that text
/// ordering matches chronological ordering.
pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(raw: &str, what: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| StoreError::Storage(format!("corrupt {} '{}': {}", what, raw, e)))
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .map_err(|e| StoreError::Storage(format!("corrupt {} '{}': {}", what, raw, e)))
}
