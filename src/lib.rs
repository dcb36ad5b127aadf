//! # Smartmark
//!
//! Smart Bookmark App - a personal bookmark service where every open session
//! of the same account stays in sync without a reload.
//!
//! ## Features
//!
//! - **OAuth sign-in**: Authorization-code flow against a configurable provider
//! - **Private bookmarks**: Every query is scoped to the signed-in owner
//! - **Realtime**: WebSocket change feed filtered by owner
//! - **Client reconciliation**: Local lists converge on the server's rows
//!
//! ## Modules
//!
//! - [`storage`]: SQLite store for users, sessions and bookmarks
//! - [`auth`]: OAuth client, session resolution, request extractors
//! - [`realtime`]: Connection hub and `/ws` protocol
//! - [`api`]: Pages and JSON API with Axum
//! - [`client`]: API client, form, reconciled list, feed subscription
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smartmark::storage::{NewBookmark, ProviderIdentity, StorageConfig, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open(StorageConfig::in_memory()).await?;
//!
//!     let ada = store.upsert_user(ProviderIdentity {
//!         provider: "google".into(),
//!         subject: "ada".into(),
//!         email: Some("ada@example.com".into()),
//!         name: Some("Ada".into()),
//!     }).await?;
//!
//!     store.insert_bookmark(ada.id, NewBookmark::new("https://www.rust-lang.org", "Rust")).await?;
//!
//!     for bookmark in store.list_bookmarks(ada.id).await? {
//!         println!("{} - {}", bookmark.title, bookmark.url);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod realtime;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    Bookmark, NewBookmark, ProviderIdentity, Session, StorageConfig, StorageError,
    StorageResult, Store, User,
};

pub use auth::{AuthError, IdentityProvider, OAuthClient, OAuthConfig, SessionClient};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use realtime::{
    websocket_handler, ChangeEvent, ClientMessage, ConnectionHub, HubConfig, HubError,
    ServerMessage,
};

pub use client::{
    ApiClient, BookmarkForm, BookmarkList, ClientConfig, ClientError, RealtimeFeed, Reconciler,
};

pub use config::{Config, ConfigError, LoggingConfig};
