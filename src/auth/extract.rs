//! Request extractors for the session token and the signed-in user.
//!
//! Browsers carry the token in the `smartmark_session` cookie; API clients
//! send `Authorization: Bearer <token>`. The cookie wins when both are set.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::convert::Infallible;
use std::sync::Arc;

use super::error::AuthError;
use crate::api::AppState;
use crate::storage::User;

pub const SESSION_COOKIE: &str = "smartmark_session";
pub const OAUTH_STATE_COOKIE: &str = "smartmark_oauth_state";

/// The raw session token, if the request carries one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionToken(pub Option<String>);

impl SessionToken {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let jar = CookieJar::from_headers(headers);
        let from_cookie = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());

        let token = from_cookie.or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        });

        SessionToken(token)
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionToken::from_headers(&parts.headers))
    }
}

/// The signed-in user. Rejects with 401 when there is none.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = SessionToken::from_headers(&parts.headers);
        match state.sessions.current_user(token.as_deref()).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(AuthError::Unauthenticated),
        }
    }
}

/// The signed-in user, if any. Lookup failures are logged and count as nobody.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = SessionToken::from_headers(&parts.headers);
        match state.sessions.current_user(token.as_deref()).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve current user");
                Ok(MaybeUser(None))
            }
        }
    }
}

/// Http-only, Lax cookie scoped to the whole site
pub fn auth_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// A cookie that, passed to `CookieJar::remove`, clears `name`
pub fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; smartmark_session=abc123"),
        );
        assert_eq!(SessionToken::from_headers(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_token_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(SessionToken::from_headers(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("smartmark_session=from-cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            SessionToken::from_headers(&headers).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(SessionToken::from_headers(&headers), SessionToken(None));
    }

    #[test]
    fn test_auth_cookie_attributes() {
        let cookie = auth_cookie(SESSION_COOKIE, "t".to_string(), true).to_string();
        assert!(cookie.starts_with("smartmark_session=t"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Path=/"));
    }
}
