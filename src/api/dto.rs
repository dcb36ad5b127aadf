//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! Responses also derive `Deserialize` so the client side can read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::{Bookmark, NewBookmark, User};

// ============================================
// BOOKMARK DTOs
// ============================================

/// Insert request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookmarkRequest {
    pub url: String,
    pub title: String,
    /// Owner the client believes it is writing for. Must match the session
    /// user when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl CreateBookmarkRequest {
    pub fn into_new_bookmark(self) -> NewBookmark {
        NewBookmark::new(self.url, self.title)
    }
}

/// Bookmark list response, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkListResponse {
    pub bookmarks: Vec<Bookmark>,
    /// Number of bookmarks returned
    pub count: usize,
}

impl From<Vec<Bookmark>> for BookmarkListResponse {
    fn from(bookmarks: Vec<Bookmark>) -> Self {
        Self {
            count: bookmarks.len(),
            bookmarks,
        }
    }
}

// ============================================
// AUTH DTOs
// ============================================

/// The signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub id: Uuid,
    pub provider: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            provider: user.provider,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

/// Query string the provider sends to `/auth/callback`
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set instead of `code` when the user declined or the provider failed
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy, unhealthy
    pub status: String,
    /// Storage status
    pub storage: String,
    /// Open realtime connections
    pub realtime_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
