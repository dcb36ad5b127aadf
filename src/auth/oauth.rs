//! OAuth 2.0 sign-in
//!
//! Authorization-code flow against a configurable provider (Google by
//! default): build the authorize URL, exchange the returned code for an
//! access token, then read the userinfo endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::error::AuthError;
use crate::storage::ProviderIdentity;

/// Endpoints and credentials for one provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// Space separated
    pub scopes: String,
}

/// Anything that can turn an authorization code into an identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start sign-in
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Redeem the code the provider sent back to the callback
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderIdentity, AuthError>;
}

/// `IdentityProvider` over HTTP
pub struct OAuthClient {
    client: Client,
    config: OAuthConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("smartmark/", env!("CARGO_PKG_VERSION")))
            .build()?;

        if config.client_id.is_empty() {
            tracing::warn!(
                provider = %config.provider,
                "OAuth client id is empty, sign-in will fail until it is configured"
            );
        }

        Ok(Self { client, config })
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.config.scopes),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderIdentity, AuthError> {
        if self.config.client_id.is_empty() {
            return Err(AuthError::NotConfigured("missing client id".to_string()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider(format!(
                "token endpoint returned {}: {}",
                status, text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("bad token response: {}", e)))?;

        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("bad userinfo response: {}", e)))?;

        tracing::debug!(provider = %self.config.provider, subject = %info.sub, "OAuth code exchanged");

        Ok(ProviderIdentity {
            provider: self.config.provider.clone(),
            subject: info.sub,
            email: info.email,
            name: info.name,
        })
    }
}
