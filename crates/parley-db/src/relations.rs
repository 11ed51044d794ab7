//! Friend relationships, stored as one edge row per unordered pair.
//!
//! `friends`, `sentRequests` and `friendRequests` of a user are all derived
//! from this table, so the two sides of a relationship can never disagree.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use parley_types::PairKey;
use parley_types::models::{ReceivedRequest, SentRequest, UserSummary};
use parley_types::relationship::{RelationState, RelationStatus, Transition, TransitionError};

use crate::error::{Result, StoreError};
use crate::models::{format_time, parse_uuid};
use crate::queries::{query_user_by_id, query_user_by_username, user_exists};
use crate::{Database, threads};

impl Database {
    /// `from` asks the user named `to_username` to become friends.
    /// Returns the recipient.
    pub fn send_friend_request(&self, from: Uuid, to_username: &str) -> Result<UserSummary> {
        self.with_tx(|tx| {
            let sender = query_user_by_id(tx, from)?.ok_or(StoreError::NotFound("User"))?;
            let recipient =
                query_user_by_username(tx, to_username)?.ok_or(StoreError::NotFound("User"))?;

            if sender.id == recipient.id {
                return Err(TransitionError::SelfRequest.into());
            }

            let pair = PairKey::new(from, recipient.id)?;
            let next = load_state(tx, &pair)?.apply(Transition::Send {
                from,
                to: recipient.id,
            })?;
            store_state(tx, &pair, next)?;

            info!(
                "Friend request {} ({}) -> {} ({})",
                sender.username, sender.id, recipient.username, recipient.id
            );
            Ok(recipient.summary())
        })
    }

    /// `to` accepts the pending request sent by `from`. Creates the pair's
    /// thread in the same transaction if it does not exist yet.
    pub fn accept_friend_request(&self, from: Uuid, to: Uuid) -> Result<()> {
        self.with_tx(|tx| {
            require_users(tx, from, to)?;
            let pair = PairKey::new(from, to)?;

            let next = load_state(tx, &pair)?.apply(Transition::Accept { from, to })?;
            store_state(tx, &pair, next)?;
            threads::insert_thread_if_absent(tx, &pair)?;

            info!("Friend request {} -> {} accepted", from, to);
            Ok(())
        })
    }

    /// `to` rejects the pending request sent by `from`.
    pub fn reject_friend_request(&self, from: Uuid, to: Uuid) -> Result<()> {
        self.with_tx(|tx| {
            require_users(tx, from, to)?;
            let pair = PairKey::new(from, to)?;

            let next = load_state(tx, &pair)?.apply(Transition::Reject { from, to })?;
            store_state(tx, &pair, next)?;

            info!("Friend request {} -> {} rejected", from, to);
            Ok(())
        })
    }

    pub fn relation_state(&self, a: Uuid, b: Uuid) -> Result<RelationState> {
        let pair = PairKey::new(a, b)?;
        self.with_conn(|conn| load_state(conn, &pair))
    }

    pub fn list_sent_requests(&self, user_id: Uuid) -> Result<Vec<SentRequest>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;
            query_sent(conn, user_id)
        })
    }

    pub fn list_received_requests(&self, user_id: Uuid) -> Result<Vec<ReceivedRequest>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;
            query_received(conn, user_id)
        })
    }

    pub fn list_friends(&self, user_id: Uuid) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            ensure_user(conn, user_id)?;
            query_friends(conn, user_id)
        })
    }
}

fn ensure_user(conn: &Connection, id: Uuid) -> Result<()> {
    if user_exists(conn, id)? {
        Ok(())
    } else {
        Err(StoreError::NotFound("User"))
    }
}

fn require_users(conn: &Connection, a: Uuid, b: Uuid) -> Result<()> {
    ensure_user(conn, a)?;
    ensure_user(conn, b)
}

fn load_state(conn: &Connection, pair: &PairKey) -> Result<RelationState> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM relations WHERE user_low = ?1 AND user_high = ?2",
            (pair.low().to_string(), pair.high().to_string()),
            |row| row.get(0),
        )
        .optional()?;

    let status = match status {
        None => None,
        Some(raw) => Some(RelationStatus::parse(&raw).ok_or_else(|| {
            StoreError::Storage(format!("corrupt relation status '{}' for {}", raw, pair))
        })?),
    };
    Ok(RelationState::from_stored(pair, status))
}

fn store_state(conn: &Connection, pair: &PairKey, state: RelationState) -> Result<()> {
    let low = pair.low().to_string();
    let high = pair.high().to_string();

    match state.to_stored(pair) {
        None => {
            conn.execute(
                "DELETE FROM relations WHERE user_low = ?1 AND user_high = ?2",
                (low, high),
            )?;
        }
        Some(status) => {
            conn.execute(
                "INSERT INTO relations (user_low, user_high, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_low, user_high)
                 DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
                (low, high, status.as_str(), format_time(Utc::now())),
            )?;
        }
    }
    Ok(())
}

/// Users on the other side of `user_id`'s relations that match `filter`.
/// `filter` may reference `r.user_low`, `r.user_high`, `r.status` and `?1`.
fn query_counterparts(
    conn: &Connection,
    user_id: Uuid,
    filter: &str,
) -> Result<Vec<(Uuid, String)>> {
    let sql = format!(
        "SELECT u.id, u.username
         FROM relations r
         JOIN users u
           ON u.id = CASE WHEN r.user_low = ?1 THEN r.user_high ELSE r.user_low END
         WHERE (r.user_low = ?1 OR r.user_high = ?1) AND ({})
         ORDER BY r.updated_at, u.username",
        filter
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, username)| Ok((parse_uuid(&id, "user id")?, username)))
        .collect()
}

pub(crate) fn query_friends(conn: &Connection, user_id: Uuid) -> Result<Vec<UserSummary>> {
    Ok(query_counterparts(conn, user_id, "r.status = 'friends'")?
        .into_iter()
        .map(|(id, username)| UserSummary { id, username })
        .collect())
}

pub(crate) fn query_sent(conn: &Connection, user_id: Uuid) -> Result<Vec<SentRequest>> {
    let filter = "(r.user_low = ?1 AND r.status = 'pending_low')
               OR (r.user_high = ?1 AND r.status = 'pending_high')";
    Ok(query_counterparts(conn, user_id, filter)?
        .into_iter()
        .map(|(to, username)| SentRequest { to, username })
        .collect())
}

pub(crate) fn query_received(conn: &Connection, user_id: Uuid) -> Result<Vec<ReceivedRequest>> {
    let filter = "(r.user_high = ?1 AND r.status = 'pending_low')
               OR (r.user_low = ?1 AND r.status = 'pending_high')";
    Ok(query_counterparts(conn, user_id, filter)?
        .into_iter()
        .map(|(from, username)| ReceivedRequest { from, username })
        .collect())
}
