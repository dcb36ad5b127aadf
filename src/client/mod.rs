//! Smartmark client
//!
//! The client half of the dashboard: an HTTP client for the JSON API, the
//! add-bookmark form, the reconciled bookmark list and the realtime feed
//! that keeps it current.
//!
//! # Example
//!
//! ```rust,ignore
//! use smartmark::client::{ApiClient, ClientConfig, RealtimeFeed, Reconciler};
//!
//! let client = ApiClient::new(ClientConfig::new("http://localhost:3000", token))?;
//! let me = client.me().await?;
//!
//! let list = Reconciler::spawn(client.list().await?);
//! let feed = RealtimeFeed::for_client(&client)?;
//! let mut subscription = feed.subscribe("bookmarks-channel", me.id, list.sender()).await?;
//! subscription.subscribed().await?;
//! ```

pub mod api;
pub mod error;
pub mod feed;
pub mod form;
pub mod reconciler;

pub use api::{ApiClient, BookmarkRemote, ClientConfig};
pub use error::ClientError;
pub use feed::{FeedSubscription, RealtimeFeed, SubscriptionStatus};
pub use form::{BookmarkForm, SubmitOutcome};
pub use reconciler::{
    delete_bookmark, BookmarkList, Reconciler, ReconcilerHandle, EMPTY_MESSAGE,
};
