//! Core data types for the Smartmark store
//!
//! - `Bookmark`: a user-owned saved link
//! - `NewBookmark`: the user-supplied part of a bookmark, validated before insert
//! - `User` / `ProviderIdentity`: accounts created by OAuth sign-in
//! - `Session`: an opaque token bound to a user until it expires

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{StorageError, StorageResult};

/// A saved link owned by exactly one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub id: Uuid,
    /// Owner of the row. Only this user can read or delete it.
    pub user_id: Uuid,
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// User-supplied fields of a bookmark
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBookmark {
    pub url: String,
    pub title: String,
}

impl NewBookmark {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }

    /// Trim both fields and check them.
    ///
    /// Title and url are required, and the url must be an absolute
    /// http(s) link (`https://example.com`, not `example.com`).
    pub fn normalized(&self) -> StorageResult<NewBookmark> {
        let url = self.url.trim();
        let title = self.title.trim();

        if title.is_empty() {
            return Err(StorageError::Validation("title is required".to_string()));
        }
        if url.is_empty() {
            return Err(StorageError::Validation("url is required".to_string()));
        }
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| StorageError::Validation(format!("url '{}' is not valid: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StorageError::Validation(format!(
                "url scheme '{}' is not allowed, use http or https",
                parsed.scheme()
            )));
        }

        Ok(NewBookmark {
            url: url.to_string(),
            title: title.to_string(),
        })
    }
}

/// An account, keyed by the identity provider's subject
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    /// Provider name, e.g. "google"
    pub provider: String,
    /// The provider's stable user id
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Best label for "Signed in as ..."
    pub fn display_name(&self) -> &str {
        self.email
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.subject)
    }
}

/// What the identity provider tells us about a signed-in person
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// A sign-in session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
