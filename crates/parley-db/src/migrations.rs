use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                number      TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            -- One row per unordered pair, user_low < user_high.
            -- No row means the pair is unconnected.
            CREATE TABLE relations (
                user_low    TEXT NOT NULL REFERENCES users(id),
                user_high   TEXT NOT NULL REFERENCES users(id),
                status      TEXT NOT NULL
                            CHECK (status IN ('pending_low', 'pending_high', 'friends')),
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (user_low, user_high),
                CHECK (user_low < user_high)
            );

            CREATE INDEX idx_relations_high ON relations(user_high);

            CREATE TABLE threads (
                id          TEXT PRIMARY KEY,
                pair_key    TEXT NOT NULL UNIQUE,
                member_low  TEXT NOT NULL REFERENCES users(id),
                member_high TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                thread_id   TEXT NOT NULL REFERENCES threads(id),
                sender      TEXT NOT NULL REFERENCES users(id),
                text        TEXT NOT NULL,
                time        TEXT NOT NULL
            );

            CREATE INDEX idx_messages_thread ON messages(thread_id, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
