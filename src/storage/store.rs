//! Smartmark Store
//!
//! SQLite-backed persistence for users, sessions and bookmarks.
//!
//! Every bookmark query takes the owner's id and filters on it, so a user can
//! never read or delete another user's rows through this API. The handlers
//! never build SQL themselves.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::time::interval;
use uuid::Uuid;

use super::error::{StorageError, StorageResult};
use super::schema;
use super::types::{Bookmark, NewBookmark, ProviderIdentity, Session, User};

/// Configuration for the store
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: Some(PathBuf::from("smartmark_data/smartmark.db")),
        }
    }
}

impl StorageConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(database_path.into()),
        }
    }

    /// Throwaway database, dropped with the store
    pub fn in_memory() -> Self {
        Self {
            database_path: None,
        }
    }
}

/// Handle to the database. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Store {
    /// std::sync::Mutex because rusqlite::Connection is !Sync
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database and run migrations
    pub async fn open(config: StorageConfig) -> StorageResult<Self> {
        let conn = match &config.database_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let path = path.clone();
                tokio::task::spawn_blocking(move || Connection::open(path)).await??
            }
            None => Connection::open_in_memory()?,
        };

        schema::migrate(&conn)?;

        match &config.database_path {
            Some(path) => tracing::info!(path = ?path, "Opened bookmark store"),
            None => tracing::info!("Opened in-memory bookmark store"),
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool
    async fn call<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StorageError::Lock(format!("Failed to acquire connection: {}", e)))?;
            f(&guard)
        })
        .await?
    }

    /// Cheap round trip used by the readiness probe
    pub async fn ping(&self) -> StorageResult<()> {
        self.call(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    /// Drop a table so later queries against it fail
    #[cfg(test)]
    pub(crate) async fn break_table(&self, table: &'static str) {
        self.call(move |conn| {
            conn.execute_batch(&format!("DROP TABLE {}", table))?;
            Ok(())
        })
        .await
        .unwrap();
    }

    // ============================================
    // USERS
    // ============================================

    /// Create the user for this identity, or refresh email/name if it exists
    pub async fn upsert_user(&self, identity: ProviderIdentity) -> StorageResult<User> {
        self.call(move |conn| {
            let now = Utc::now().timestamp_micros();
            conn.execute(
                "INSERT INTO users (id, provider, subject, email, name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(provider, subject)
                 DO UPDATE SET email = excluded.email, name = excluded.name",
                params![
                    Uuid::new_v4().to_string(),
                    identity.provider,
                    identity.subject,
                    identity.email,
                    identity.name,
                    now
                ],
            )?;

            let user = conn.query_row(
                "SELECT id, provider, subject, email, name, created_at
                 FROM users WHERE provider = ?1 AND subject = ?2",
                params![identity.provider, identity.subject],
                row_to_user,
            )?;
            Ok(user)
        })
        .await
    }

    // ============================================
    // SESSIONS
    // ============================================

    /// Start a session for a user, valid for `ttl`
    pub async fn create_session(&self, user_id: Uuid, ttl: Duration) -> StorageResult<Session> {
        self.call(move |conn| {
            let created_at = truncate_micros(Utc::now());
            let session = Session {
                token: new_session_token(),
                user_id,
                created_at,
                expires_at: created_at + ttl,
            };
            conn.execute(
                "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.token,
                    session.user_id.to_string(),
                    session.created_at.timestamp_micros(),
                    session.expires_at.timestamp_micros()
                ],
            )?;
            Ok(session)
        })
        .await
    }

    /// Resolve a session token to its user. Unknown or expired tokens give `None`.
    pub async fn session_user(&self, token: &str) -> StorageResult<Option<User>> {
        let token = token.to_string();
        self.call(move |conn| {
            let now = Utc::now().timestamp_micros();
            let user = conn
                .query_row(
                    "SELECT u.id, u.provider, u.subject, u.email, u.name, u.created_at
                     FROM sessions s JOIN users u ON u.id = s.user_id
                     WHERE s.token = ?1 AND s.expires_at > ?2",
                    params![token, now],
                    row_to_user,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    /// End a session. Returns whether a session was removed.
    pub async fn delete_session(&self, token: &str) -> StorageResult<bool> {
        let token = token.to_string();
        self.call(move |conn| {
            let affected = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
            Ok(affected > 0)
        })
        .await
    }

    /// Drop every session past its expiry. Returns how many were removed.
    pub async fn purge_expired_sessions(&self) -> StorageResult<usize> {
        self.call(|conn| {
            let now = Utc::now().timestamp_micros();
            let affected = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
            Ok(affected)
        })
        .await
    }

    /// Start background task that purges expired sessions
    pub fn start_session_sweeper(&self, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(every);

            loop {
                ticker.tick().await;

                match store.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "Purged expired sessions"),
                    Err(e) => tracing::error!("Session purge failed: {}", e),
                }
            }
        })
    }

    // ============================================
    // BOOKMARKS
    // ============================================

    /// Insert a bookmark owned by `owner`
    pub async fn insert_bookmark(&self, owner: Uuid, input: NewBookmark) -> StorageResult<Bookmark> {
        let input = input.normalized()?;

        self.call(move |conn| {
            let bookmark = Bookmark {
                id: Uuid::new_v4(),
                user_id: owner,
                url: input.url,
                title: input.title,
                created_at: truncate_micros(Utc::now()),
            };
            conn.execute(
                "INSERT INTO bookmarks (id, user_id, url, title, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    bookmark.id.to_string(),
                    bookmark.user_id.to_string(),
                    bookmark.url,
                    bookmark.title,
                    bookmark.created_at.timestamp_micros()
                ],
            )?;
            Ok(bookmark)
        })
        .await
    }

    /// All of `owner`'s bookmarks, newest first
    pub async fn list_bookmarks(&self, owner: Uuid) -> StorageResult<Vec<Bookmark>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, url, title, created_at FROM bookmarks
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map(params![owner.to_string()], row_to_bookmark)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Delete one of `owner`'s bookmarks, returning the removed row.
    ///
    /// `None` when the id does not exist or belongs to someone else.
    pub async fn delete_bookmark(&self, owner: Uuid, id: Uuid) -> StorageResult<Option<Bookmark>> {
        self.call(move |conn| {
            let existing = conn
                .query_row(
                    "SELECT id, user_id, url, title, created_at FROM bookmarks
                     WHERE id = ?1 AND user_id = ?2",
                    params![id.to_string(), owner.to_string()],
                    row_to_bookmark,
                )
                .optional()?;

            if existing.is_some() {
                conn.execute(
                    "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2",
                    params![id.to_string(), owner.to_string()],
                )?;
            }
            Ok(existing)
        })
        .await
    }
}

/// 256 random bits, hex encoded
fn new_session_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Drop sub-microsecond precision so values survive a round trip through the table
fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

fn column_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn column_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: column_uuid(row, 0)?,
        provider: row.get(1)?,
        subject: row.get(2)?,
        email: row.get(3)?,
        name: row.get(4)?,
        created_at: column_timestamp(row, 5)?,
    })
}

fn row_to_bookmark(row: &Row) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: column_uuid(row, 0)?,
        user_id: column_uuid(row, 1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        created_at: column_timestamp(row, 4)?,
    })
}
