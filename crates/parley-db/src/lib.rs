pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod relations;
pub mod threads;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

pub use error::{Result, StoreError};

/// SQLite-backed identity, relationship and thread store.
///
/// A single connection sits behind a mutex. Every mutation runs in an
/// immediate transaction, which makes each per-pair read-modify-write atomic.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh private database, used by tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction. The transaction is
    /// committed only if `f` succeeds.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("DB lock poisoned: {}", e)))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use uuid::Uuid;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    /// Registers a user with a throwaway hash and a number derived from `n`.
    pub fn user(db: &Database, username: &str, n: u8) -> Uuid {
        let id = Uuid::new_v4();
        let number = format!("{}", n % 10).repeat(10);
        db.create_user(id, username, "hash", &number).unwrap();
        id
    }
}
