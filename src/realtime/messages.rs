//! Realtime Message Types
//!
//! Wire format shared by the `/ws` endpoint and the client feed. Every frame
//! is a JSON object tagged by `type`; change payloads are tagged by
//! `event_type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::Bookmark;

/// The only table the feed publishes
pub const BOOKMARKS_TABLE: &str = "bookmarks";

fn default_table() -> String {
    BOOKMARKS_TABLE.to_string()
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Listen for row changes on a named channel
    Subscribe {
        /// Client-chosen channel name, echoed back on every change
        channel: String,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default)]
        event: EventFilter,
        /// Row filter, `user_id=eq.{uuid}`. Omitted means the caller's own rows.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    /// Stop listening on a channel
    Unsubscribe { channel: String },
    /// Keepalive
    Ping,
}

impl ClientMessage {
    /// Subscribe to every change of one user's bookmarks
    pub fn subscribe_owner(channel: impl Into<String>, owner: Uuid) -> Self {
        ClientMessage::Subscribe {
            channel: channel.into(),
            table: BOOKMARKS_TABLE.to_string(),
            event: EventFilter::All,
            filter: Some(owner_filter(owner)),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected { connection_id: String },
    /// Subscription confirmed
    Subscribed { channel: String, topic: String },
    /// Unsubscription confirmed
    Unsubscribed { channel: String },
    /// A row changed
    Change { channel: String, payload: ChangeEvent },
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
}

/// Which change kinds a subscription wants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFilter {
    #[default]
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl EventFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        matches!(
            (self, event),
            (EventFilter::All, _)
                | (EventFilter::Insert, ChangeEvent::Insert { .. })
                | (EventFilter::Update, ChangeEvent::Update { .. })
                | (EventFilter::Delete, ChangeEvent::Delete { .. })
        )
    }
}

/// Identifier of a row that is gone (or about to change)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRef {
    pub id: Uuid,
}

/// A row-level change to the bookmarks table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert {
        table: String,
        commit_timestamp: DateTime<Utc>,
        new: Bookmark,
    },
    Update {
        table: String,
        commit_timestamp: DateTime<Utc>,
        new: Bookmark,
        old: BookmarkRef,
    },
    Delete {
        table: String,
        commit_timestamp: DateTime<Utc>,
        old: BookmarkRef,
    },
}

impl ChangeEvent {
    pub fn inserted(bookmark: Bookmark) -> Self {
        ChangeEvent::Insert {
            table: BOOKMARKS_TABLE.to_string(),
            commit_timestamp: Utc::now(),
            new: bookmark,
        }
    }

    pub fn deleted(id: Uuid) -> Self {
        ChangeEvent::Delete {
            table: BOOKMARKS_TABLE.to_string(),
            commit_timestamp: Utc::now(),
            old: BookmarkRef { id },
        }
    }

    pub fn commit_timestamp(&self) -> DateTime<Utc> {
        match self {
            ChangeEvent::Insert {
                commit_timestamp, ..
            }
            | ChangeEvent::Update {
                commit_timestamp, ..
            }
            | ChangeEvent::Delete {
                commit_timestamp, ..
            } => *commit_timestamp,
        }
    }
}

/// `user_id=eq.{owner}`
pub fn owner_filter(owner: Uuid) -> String {
    format!("user_id=eq.{}", owner)
}

/// Parse `user_id=eq.{uuid}` back into the owner id
pub fn parse_owner_filter(filter: &str) -> Option<Uuid> {
    let value = filter.trim().strip_prefix("user_id=eq.")?;
    Uuid::parse_str(value).ok()
}

/// Topic a user's changes are published on
pub fn owner_topic(owner: Uuid) -> String {
    format!("{}:{}", BOOKMARKS_TABLE, owner_filter(owner))
}
