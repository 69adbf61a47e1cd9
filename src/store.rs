//! Crash/reload persistence.
//!
//! Two named JSON blobs (queue, config) in a single SQLite table. Saves run
//! inside `spawn_blocking` (rusqlite is synchronous) and are best-effort:
//! failures are logged and swallowed, the in-memory state stays
//! authoritative for the session.
//!
//! DB location:
//! - Can be overridden with MEDIAREQUEST_DB_PATH
//! - Defaults to ./mediarequest.db next to the engine

use rusqlite::{params, Connection, OptionalExtension};

pub const QUEUE_BLOB: &str = "queue";
pub const CONFIG_BLOB: &str = "config";

pub fn db_path() -> String {
    std::env::var("MEDIAREQUEST_DB_PATH").unwrap_or_else(|_| "mediarequest.db".to_string())
}

fn db_init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS blobs (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
}

fn db_save(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    db_init(conn)?;
    conn.execute(
        "INSERT INTO blobs(key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn db_load(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    db_init(conn)?;
    conn.query_row("SELECT value FROM blobs WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
}

/// Persist one blob; never fails the caller.
pub async fn save_blob(key: &'static str, value: String) {
    let path = db_path();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let conn = Connection::open(path)?;
        db_save(&conn, key, &value)?;
        Ok(())
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("failed to persist {key} blob to sqlite: {e}"),
        Err(e) => tracing::warn!("failed to join {key} persistence task: {e}"),
    }
}

/// Load one blob; absent and failed both come back as `None`.
pub async fn load_blob(key: &'static str) -> Option<String> {
    let path = db_path();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<String>> {
        let conn = Connection::open(path)?;
        Ok(db_load(&conn, key)?)
    })
    .await;
    match result {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::warn!("failed to load {key} blob from sqlite: {e}");
            None
        }
        Err(e) => {
            tracing::warn!("failed to join {key} load task: {e}");
            None
        }
    }
}
