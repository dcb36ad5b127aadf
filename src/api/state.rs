//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::templates::Pages;
use crate::auth::{IdentityProvider, SessionClient};
use crate::realtime::{ChangeEvent, ConnectionHub, HubConfig};
use crate::storage::{Bookmark, NewBookmark, Store, User};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Users, sessions and bookmarks
    pub store: Store,
    /// Resolves session tokens to users
    pub sessions: SessionClient,
    /// OAuth provider used by the sign-in flow
    pub identity: Arc<dyn IdentityProvider>,
    /// Realtime hub that receives every committed change
    pub hub: Arc<ConnectionHub>,
    /// Compiled page templates
    pub pages: Arc<Pages>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Store,
        identity: Arc<dyn IdentityProvider>,
        config: ApiConfig,
        hub_config: HubConfig,
    ) -> ApiResult<Self> {
        let pages = Pages::new(config.provider_label.clone())
            .map_err(|e| ApiError::Internal(format!("templates: {}", e)))?;

        Ok(Self {
            sessions: SessionClient::new(store.clone(), config.session_ttl),
            store,
            identity,
            hub: Arc::new(ConnectionHub::new(hub_config)),
            pages: Arc::new(pages),
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Insert a bookmark for `owner` and push the insert to their feed
    pub async fn create_bookmark(&self, owner: &User, input: NewBookmark) -> ApiResult<Bookmark> {
        let bookmark = self.store.insert_bookmark(owner.id, input).await?;
        tracing::info!(user_id = %owner.id, bookmark_id = %bookmark.id, "Bookmark created");

        self.hub
            .publish(owner.id, &ChangeEvent::inserted(bookmark.clone()))
            .await;
        Ok(bookmark)
    }

    /// Delete one of `owner`'s bookmarks and push the delete to their feed
    pub async fn delete_bookmark(&self, owner: &User, id: Uuid) -> ApiResult<Bookmark> {
        let removed = self
            .store
            .delete_bookmark(owner.id, id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("bookmark {}", id)))?;
        tracing::info!(user_id = %owner.id, bookmark_id = %id, "Bookmark deleted");

        self.hub.publish(owner.id, &ChangeEvent::deleted(id)).await;
        Ok(removed)
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL without trailing slash
    pub site_url: String,
    /// Mark auth cookies `Secure`
    pub secure_cookies: bool,
    /// How long a sign-in lasts
    pub session_ttl: chrono::Duration,
    /// Shown on the sign-in button
    pub provider_label: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            site_url: "http://localhost:3000".to_string(),
            secure_cookies: false,
            session_ttl: chrono::Duration::days(7),
            provider_label: "Google".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Where the identity provider sends the browser back to
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }
}
