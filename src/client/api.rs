//! Smartmark REST API Client
//!
//! HTTP client for the `/api/v1` surface, authenticated with a session
//! token sent as a bearer header.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

use super::error::ClientError;
use crate::api::dto::{BookmarkListResponse, CreateBookmarkRequest, UserResponse};
use crate::storage::Bookmark;

/// The remote mutations the form and the list issue
#[async_trait]
pub trait BookmarkRemote: Send + Sync {
    /// Insert a row; the server assigns id and timestamp
    async fn insert(&self, request: CreateBookmarkRequest) -> Result<Bookmark, ClientError>;

    /// Remove a row by id
    async fn delete(&self, id: Uuid) -> Result<(), ClientError>;
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server (e.g., "http://localhost:3000")
    pub base_url: String,
    /// Value of the `smartmark_session` cookie
    pub session_token: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_token: session_token.into(),
            request_timeout_ms: 10_000,
        }
    }
}

pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `ws://` / `wss://` URL of the realtime endpoint
    pub fn websocket_url(&self) -> Result<String, ClientError> {
        let base = &self.config.base_url;
        let rest = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(ClientError::InvalidUrl(base.clone()));
        };
        Ok(format!("{}/ws", rest))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.config.base_url, path)
    }

    /// The signed-in user
    pub async fn me(&self) -> Result<UserResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/me"))
            .bearer_auth(&self.config.session_token)
            .send()
            .await?;
        read_json(response).await
    }

    /// All bookmarks, newest first
    pub async fn list(&self) -> Result<Vec<Bookmark>, ClientError> {
        let response = self
            .client
            .get(self.url("/bookmarks"))
            .bearer_auth(&self.config.session_token)
            .send()
            .await?;
        let list: BookmarkListResponse = read_json(response).await?;
        Ok(list.bookmarks)
    }
}

#[async_trait]
impl BookmarkRemote for ApiClient {
    async fn insert(&self, request: CreateBookmarkRequest) -> Result<Bookmark, ClientError> {
        let response = self
            .client
            .post(self.url("/bookmarks"))
            .bearer_auth(&self.config.session_token)
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/bookmarks/{}", id)))
            .bearer_auth(&self.config.session_token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json().await?)
}

/// Pull `error.message` out of the server's error body when there is one
async fn api_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(text);

    ClientError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        let client = ApiClient::new(ClientConfig::new("http://localhost:3000/", "t")).unwrap();
        assert_eq!(client.websocket_url().unwrap(), "ws://localhost:3000/ws");

        let client = ApiClient::new(ClientConfig::new("https://marks.example.com", "t")).unwrap();
        assert_eq!(client.websocket_url().unwrap(), "wss://marks.example.com/ws");

        let client = ApiClient::new(ClientConfig::new("ftp://nope", "t")).unwrap();
        assert!(matches!(client.websocket_url(), Err(ClientError::InvalidUrl(_))));
    }
}
