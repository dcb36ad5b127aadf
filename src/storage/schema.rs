//! Schema migrations for the Smartmark database.
//!
//! A `schema_version` table records which migrations have run, so opening
//! an existing database is idempotent.

use rusqlite::{params, Connection};

/// Bump when adding a migration.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Highest applied migration, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Run every pending migration.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at INTEGER NOT NULL,
             description TEXT NOT NULL
         );",
    )?;

    let current = schema_version(conn)?;

    if current < 1 {
        migration_v1(conn)?;
        record_version(conn, 1, "users, sessions, bookmarks")?;
        tracing::info!(version = 1, "Applied schema migration");
    }

    Ok(())
}

fn record_version(conn: &Connection, version: i32, description: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        params![version, chrono::Utc::now().timestamp(), description],
    )?;
    Ok(())
}

/// V1: accounts, sessions and the bookmarks table.
///
/// Timestamps are microseconds since the epoch so that `ORDER BY created_at`
/// is exact.
fn migration_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            subject TEXT NOT NULL,
            email TEXT,
            name TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(provider, subject)
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);

        CREATE TABLE IF NOT EXISTS bookmarks (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_bookmarks_owner_created
            ON bookmarks(user_id, created_at DESC);
        ",
    )
}
