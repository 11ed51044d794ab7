//! Per-pair message threads.
//!
//! A thread is created on the write path only (first message or accepted
//! friend request). Reads never create anything.

use chrono::{SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use parley_types::PairKey;
use parley_types::models::Message;

use crate::error::{Result, StoreError};
use crate::models::{MessageRow, ThreadRow, format_time, parse_time, parse_uuid};
use crate::queries::user_exists;
use crate::Database;

impl Database {
    pub fn get_or_create_thread(&self, a: Uuid, b: Uuid) -> Result<ThreadRow> {
        let pair = PairKey::new(a, b)?;
        self.with_tx(|tx| insert_thread_if_absent(tx, &pair))
    }

    /// Append a message from `sender` to the pair's thread, creating the
    /// thread if needed. The stored time never goes backwards within a thread.
    pub fn append_message(&self, pair: &PairKey, sender: Uuid, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(StoreError::validation("text", "Message text is required"));
        }
        if !pair.contains(sender) {
            return Err(StoreError::NotFound("Thread"));
        }

        self.with_tx(|tx| {
            if !user_exists(tx, pair.low())? || !user_exists(tx, pair.high())? {
                return Err(StoreError::NotFound("User"));
            }

            let thread = insert_thread_if_absent(tx, pair)?;

            let last: Option<String> = tx
                .query_row(
                    "SELECT time FROM messages WHERE thread_id = ?1 ORDER BY seq DESC LIMIT 1",
                    [thread.id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            // Stored with microsecond precision; truncate so the returned
            // message equals what a later read yields.
            let now = Utc::now().trunc_subsecs(6);
            let time = match last {
                Some(raw) => now.max(parse_time(&raw, "message time")?),
                None => now,
            };

            let message = Message {
                id: Uuid::new_v4(),
                sender,
                text: text.to_string(),
                time,
            };
            tx.execute(
                "INSERT INTO messages (id, thread_id, sender, text, time) VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    message.id.to_string(),
                    thread.id.to_string(),
                    sender.to_string(),
                    &message.text,
                    format_time(time),
                ),
            )?;

            debug!("Stored message {} in thread {}", message.id, pair);
            Ok(message)
        })
    }

    /// Delete a message. Only its sender may delete it; any other requester
    /// gets `NotFound`, exactly as if the message did not exist.
    pub fn delete_message(&self, message_id: Uuid, requester: Uuid) -> Result<()> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM messages WHERE id = ?1 AND sender = ?2",
                (message_id.to_string(), requester.to_string()),
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound("Message"));
            }
            Ok(())
        })
    }

    /// Messages between `a` and `b`, oldest first. Empty when the pair has
    /// never exchanged a message.
    pub fn read_thread(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let pair = PairKey::new(a, b)?;
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender, m.text, m.time
                 FROM messages m
                 JOIN threads t ON t.id = m.thread_id
                 WHERE t.pair_key = ?1
                 ORDER BY m.seq",
            )?;

            let rows = stmt
                .query_map([pair.to_string()], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender: row.get(1)?,
                        text: row.get(2)?,
                        time: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    pub fn thread_count(&self, a: Uuid, b: Uuid) -> Result<usize> {
        let pair = PairKey::new(a, b)?;
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM threads WHERE pair_key = ?1",
                [pair.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

/// The unique `pair_key` column makes concurrent first inserts converge on
/// a single thread.
pub(crate) fn insert_thread_if_absent(conn: &Connection, pair: &PairKey) -> Result<ThreadRow> {
    conn.execute(
        "INSERT OR IGNORE INTO threads (id, pair_key, member_low, member_high, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            Uuid::new_v4().to_string(),
            pair.to_string(),
            pair.low().to_string(),
            pair.high().to_string(),
            format_time(Utc::now()),
        ),
    )?;

    let (id, pair_key, created_at): (String, String, String) = conn.query_row(
        "SELECT id, pair_key, created_at FROM threads WHERE pair_key = ?1",
        [pair.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    Ok(ThreadRow {
        id: parse_uuid(&id, "thread id")?,
        pair_key,
        created_at: parse_time(&created_at, "thread created_at")?,
    })
}
