use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use parley_types::models::UserProfile;

use crate::error::{Result, StoreError};
use crate::models::{UserRow, format_time, parse_time, parse_uuid};
use crate::{Database, relations};

impl Database {
    // -- Users --

    /// Insert a new user. Fails `Conflict` when the username or the phone
    /// number is already registered.
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        number: &str,
    ) -> Result<()> {
        self.with_tx(|tx| {
            let taken: Option<String> = tx
                .query_row(
                    "SELECT id FROM users WHERE username = ?1 OR number = ?2 LIMIT 1",
                    (username, number),
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Err(StoreError::Conflict(
                    "Username or number already exists".into(),
                ));
            }

            tx.execute(
                "INSERT INTO users (id, username, password, number, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    id.to_string(),
                    username,
                    password_hash,
                    number,
                    format_time(Utc::now()),
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// User record plus its three relationship projections.
    pub fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            let Some(user) = query_user_by_id(conn, id)? else {
                return Ok(None);
            };

            let friends = relations::query_friends(conn, id)?
                .into_iter()
                .map(|u| u.id)
                .collect();
            let sent_requests = relations::query_sent(conn, id)?
                .into_iter()
                .map(|r| r.to)
                .collect();
            let friend_requests = relations::query_received(conn, id)?
                .into_iter()
                .map(|r| r.from)
                .collect();

            Ok(Some(UserProfile {
                id: user.id,
                username: user.username,
                number: user.number,
                friends,
                friend_requests,
                sent_requests,
                created_at: user.created_at,
            }))
        })
    }
}

type RawUser = (String, String, String, String, String);

fn raw_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_user_row((id, username, password, number, created_at): RawUser) -> Result<UserRow> {
    Ok(UserRow {
        id: parse_uuid(&id, "user id")?,
        username,
        password,
        number,
        created_at: parse_time(&created_at, "user created_at")?,
    })
}

pub(crate) fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, number, created_at FROM users WHERE username = ?1",
    )?;

    stmt.query_row([username], raw_user)
        .optional()?
        .map(into_user_row)
        .transpose()
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, number, created_at FROM users WHERE id = ?1",
    )?;

    stmt.query_row([id.to_string()], raw_user)
        .optional()?
        .map(into_user_row)
        .transpose()
}

pub(crate) fn user_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [id.to_string()], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}
