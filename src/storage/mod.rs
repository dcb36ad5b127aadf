//! Smartmark Storage
//!
//! The authoritative copy of every bookmark, plus the accounts and sessions
//! created by OAuth sign-in:
//!
//! - **types**: Core data structures (Bookmark, NewBookmark, User, Session)
//! - **schema**: Versioned SQLite migrations
//! - **store**: Owner-scoped queries behind an async API
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use smartmark::storage::{NewBookmark, ProviderIdentity, StorageConfig, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open(StorageConfig::new("./smartmark.db")).await?;
//!
//!     let user = store.upsert_user(ProviderIdentity {
//!         provider: "google".into(),
//!         subject: "1234".into(),
//!         email: Some("ada@example.com".into()),
//!         name: None,
//!     }).await?;
//!
//!     store.insert_bookmark(user.id, NewBookmark::new("https://example.com", "Example")).await?;
//!     let newest_first = store.list_bookmarks(user.id).await?;
//!     println!("{} bookmarks", newest_first.len());
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use store::{StorageConfig, Store};
pub use types::{Bookmark, NewBookmark, ProviderIdentity, Session, User};
