//! Smartmark HTTP layer
//!
//! Pages, the OAuth flow, the JSON API and the realtime endpoint, built
//! with Axum.
//!
//! # Endpoints
//!
//! ## Pages
//! - `GET /` - Landing page (redirects to the dashboard when signed in)
//! - `GET /dashboard` - Bookmark dashboard (redirects to `/` when anonymous)
//! - `POST /bookmarks` - Form insert
//! - `POST /bookmarks/:id/delete` - Form delete
//!
//! ## Auth
//! - `POST /auth/sign-in` - Start OAuth sign-in
//! - `GET /auth/callback` - OAuth redirect target
//! - `POST /auth/sign-out` - End the session
//!
//! ## Bookmarks (JSON, session required)
//! - `GET /api/v1/me` - Current user
//! - `GET /api/v1/bookmarks` - List, newest first
//! - `POST /api/v1/bookmarks` - Create
//! - `DELETE /api/v1/bookmarks/:id` - Delete
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Realtime change feed (session required)
//!
//! # Example
//!
//! ```rust,ignore
//! use smartmark::api::{serve, ApiConfig, AppState};
//! use smartmark::auth::{OAuthClient, OAuthConfig};
//! use smartmark::realtime::HubConfig;
//! use smartmark::storage::{StorageConfig, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open(StorageConfig::default()).await?;
//!     let identity = Arc::new(OAuthClient::new(oauth_config)?);
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(store, identity, config.clone(), HubConfig::default())?;
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
pub mod templates;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::realtime::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/me", get(routes::bookmarks::me))
        .route(
            "/bookmarks",
            get(routes::bookmarks::list_bookmarks).post(routes::bookmarks::create_bookmark),
        )
        .route("/bookmarks/:id", delete(routes::bookmarks::delete_bookmark));

    let auth_routes = Router::new()
        .route("/sign-in", post(routes::auth::sign_in))
        .route("/callback", get(routes::auth::callback))
        .route("/sign-out", post(routes::auth::sign_out));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(routes::pages::landing))
        .route("/dashboard", get(routes::pages::dashboard))
        .route("/bookmarks", post(routes::pages::create_from_form))
        .route("/bookmarks/:id/delete", post(routes::pages::delete_from_form))
        .route("/ws", get(websocket_handler))
        .nest("/auth", auth_routes)
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Smartmark listening on {} ({})", addr, config.site_url);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Smartmark shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

/// Shared fixtures for router-level tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::auth::{AuthError, IdentityProvider};
    use crate::realtime::HubConfig;
    use crate::storage::{ProviderIdentity, StorageConfig, Store, User};
    use async_trait::async_trait;

    /// Accepts any code; the code doubles as the provider subject
    pub struct FakeIdentity;

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
            format!(
                "https://id.example.com/authorize?state={}&redirect_uri={}",
                state,
                urlencoding::encode(redirect_uri)
            )
        }

        async fn exchange_code(
            &self,
            code: &str,
            _redirect_uri: &str,
        ) -> Result<ProviderIdentity, AuthError> {
            if code == "rejected" {
                return Err(AuthError::Provider("invalid_grant".to_string()));
            }
            Ok(ProviderIdentity {
                provider: "google".to_string(),
                subject: code.to_string(),
                email: Some(format!("{}@example.com", code)),
                name: None,
            })
        }
    }

    pub async fn test_state() -> AppState {
        let store = Store::open(StorageConfig::in_memory()).await.unwrap();
        AppState::new(
            store,
            Arc::new(FakeIdentity),
            ApiConfig::default(),
            HubConfig::default(),
        )
        .unwrap()
    }

    /// Sign `subject` in and return the user with their session token
    pub async fn signed_in(state: &AppState, subject: &str) -> (User, String) {
        let session = state
            .sessions
            .sign_in(ProviderIdentity {
                provider: "google".to_string(),
                subject: subject.to_string(),
                email: Some(format!("{}@example.com", subject)),
                name: None,
            })
            .await
            .unwrap();
        let user = state
            .sessions
            .current_user(Some(&session.token))
            .await
            .unwrap()
            .unwrap();
        (user, session.token)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{signed_in, test_state};
    use super::*;
    use crate::storage::{Bookmark, NewBookmark};
    use axum::{
        body::Body,
        http::{header, Request, Response, StatusCode},
    };
    use tower::util::ServiceExt;

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("smartmark_session={}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, token: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response<Body>) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    fn set_cookies(response: &Response<Body>) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = build_router(test_state().await);
        let response = app.oneshot(get("/health/live", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = build_router(test_state().await);
        let response = app.oneshot(get("/health/ready", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = build_router(test_state().await);
        let response = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"status\":\"healthy\""));
    }

    #[tokio::test]
    async fn test_landing_for_anonymous_visitor() {
        let app = build_router(test_state().await);
        let response = app.oneshot(get("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Smart Bookmark App"));
        assert!(html.contains("Sign in with Google"));
    }

    #[tokio::test]
    async fn test_landing_redirects_signed_in_user() {
        let state = test_state().await;
        let (_, token) = signed_in(&state, "ada").await;
        let app = build_router(state);

        let response = app.oneshot(get("/", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");
    }

    #[tokio::test]
    async fn test_dashboard_redirects_anonymous_visitor() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(get("/dashboard", Some("expired-or-bogus")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn test_dashboard_lists_own_bookmarks_newest_first() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let (bob, _) = signed_in(&state, "bob").await;

        state
            .create_bookmark(&ada, NewBookmark::new("https://old.example.com", "Older"))
            .await
            .unwrap();
        state
            .create_bookmark(&ada, NewBookmark::new("https://new.example.com", "Newer"))
            .await
            .unwrap();
        state
            .create_bookmark(&bob, NewBookmark::new("https://bob.example.com", "Bobs"))
            .await
            .unwrap();

        let app = build_router(state);
        let response = app.oneshot(get("/dashboard", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = body_text(response).await;
        assert!(html.contains("Signed in as ada@example.com"));
        let newer = html.find("Newer").unwrap();
        let older = html.find("Older").unwrap();
        assert!(newer < older);
        assert!(!html.contains("Bobs"));
    }

    #[tokio::test]
    async fn test_session_lookup_failure_degrades_per_surface() {
        let state = test_state().await;
        let (_, token) = signed_in(&state, "ada").await;
        state.store.break_table("sessions").await;
        let app = build_router(state);

        // Pages treat the visitor as signed out
        let response = app.clone().oneshot(get("/dashboard", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let response = app.clone().oneshot(get("/", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Sign in with Google"));

        // The JSON API reports the failure
        let response = app.oneshot(get("/api/v1/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_dashboard_renders_empty_list_when_fetch_fails() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        state
            .create_bookmark(&ada, NewBookmark::new("https://example.com", "Example"))
            .await
            .unwrap();
        state.store.break_table("bookmarks").await;
        let app = build_router(state);

        let response = app.oneshot(get("/dashboard", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = body_text(response).await;
        assert!(html.contains("My Bookmarks"));
        assert!(html.contains(r#"<p id="empty" class="empty">"#));
        assert!(html.contains(crate::client::EMPTY_MESSAGE));
        assert!(!html.contains("https:&#x2F;&#x2F;example.com"));
    }

    #[tokio::test]
    async fn test_api_requires_session() {
        let app = build_router(test_state().await);
        let response = app.oneshot(get("/api/v1/bookmarks", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("\"code\":\"UNAUTHORIZED\""));
    }

    #[tokio::test]
    async fn test_ws_requires_session() {
        let app = build_router(test_state().await);
        let response = app.oneshot(get("/ws", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let app = build_router(state);

        let response = app.oneshot(get("/api/v1/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me: dto::UserResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(me.id, ada.id);
    }

    #[tokio::test]
    async fn test_create_and_list_bookmark() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let app = build_router(state);

        let body = format!(
            r#"{{"user_id": "{}", "url": " https://example.com ", "title": "Example"}}"#,
            ada.id
        );
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/bookmarks", &token, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Bookmark = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(created.user_id, ada.id);
        assert_eq!(created.url, "https://example.com");

        let response = app
            .oneshot(get("/api/v1/bookmarks", Some(&token)))
            .await
            .unwrap();
        let list: dto::BookmarkListResponse =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.bookmarks, vec![created]);
    }

    #[tokio::test]
    async fn test_create_for_other_user_is_forbidden() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let (bob, _) = signed_in(&state, "bob").await;
        let app = build_router(state.clone());

        let body = format!(
            r#"{{"user_id": "{}", "url": "https://example.com", "title": "Example"}}"#,
            bob.id
        );
        let response = app
            .oneshot(json_request("POST", "/api/v1/bookmarks", &token, body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(state.store.list_bookmarks(ada.id).await.unwrap().is_empty());
        assert!(state.store.list_bookmarks(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let state = test_state().await;
        let (_, token) = signed_in(&state, "ada").await;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/bookmarks",
                &token,
                r#"{"url": "https://example.com", "title": "  "}"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/bookmarks",
                &token,
                r#"{"url": "javascript:alert(1)", "title": "Click me"}"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/bookmarks",
                &token,
                "not json".to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_bookmark() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let (_, bob_token) = signed_in(&state, "bob").await;
        let bookmark = state
            .create_bookmark(&ada, NewBookmark::new("https://example.com", "Example"))
            .await
            .unwrap();
        let app = build_router(state.clone());
        let uri = format!("/api/v1/bookmarks/{}", bookmark.id);

        // Someone else's id looks like a missing row
        let response = app
            .clone()
            .oneshot(json_request("DELETE", &uri, &bob_token, String::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(json_request("DELETE", &uri, &token, String::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.store.list_bookmarks(ada.id).await.unwrap().is_empty());

        let response = app
            .oneshot(json_request("DELETE", &uri, &token, String::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_form_fallbacks() {
        let state = test_state().await;
        let (ada, token) = signed_in(&state, "ada").await;
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/bookmarks")
                    .header(header::COOKIE, format!("smartmark_session={}", token))
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("title=Example&url=https%3A%2F%2Fexample.com"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");

        let saved = state.store.list_bookmarks(ada.id).await.unwrap();
        assert_eq!(saved.len(), 1);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/bookmarks/{}/delete", saved[0].id))
                    .header(header::COOKIE, format!("smartmark_session={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(location(&response), "/dashboard");
        assert!(state.store.list_bookmarks(ada.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_redirects_to_provider() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/sign-in")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let target = location(&response);
        assert!(target.starts_with("https://id.example.com/authorize?state="));
        assert!(target.contains("http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));

        let cookies = set_cookies(&response);
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("smartmark_oauth_state=") && c.contains("HttpOnly")));
    }

    #[tokio::test]
    async fn test_callback_signs_user_in() {
        let state = test_state().await;
        let app = build_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/callback?code=ada&state=nonce1")
                    .header(header::COOKIE, "smartmark_oauth_state=nonce1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");

        let cookies = set_cookies(&response);
        let session = cookies
            .iter()
            .find_map(|c| c.strip_prefix("smartmark_session="))
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_string();

        let user = state
            .sessions
            .current_user(Some(&session))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn test_callback_with_wrong_state_creates_no_session() {
        let app = build_router(test_state().await);

        for request in [
            Request::builder()
                .uri("/auth/callback?code=ada&state=forged")
                .header(header::COOKIE, "smartmark_oauth_state=nonce1")
                .body(Body::empty())
                .unwrap(),
            Request::builder()
                .uri("/auth/callback?code=ada&state=nonce1")
                .body(Body::empty())
                .unwrap(),
            Request::builder()
                .uri("/auth/callback?code=rejected&state=nonce1")
                .header(header::COOKIE, "smartmark_oauth_state=nonce1")
                .body(Body::empty())
                .unwrap(),
            Request::builder()
                .uri("/auth/callback?error=access_denied&state=nonce1")
                .header(header::COOKIE, "smartmark_oauth_state=nonce1")
                .body(Body::empty())
                .unwrap(),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(location(&response), "/");
            assert!(!set_cookies(&response)
                .iter()
                .any(|c| c.starts_with("smartmark_session=")));
        }
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_session() {
        let state = test_state().await;
        let (_, token) = signed_in(&state, "ada").await;
        let app = build_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/sign-out")
                    .header(header::COOKIE, format!("smartmark_session={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(location(&response), "/");
        assert!(state
            .sessions
            .current_user(Some(&token))
            .await
            .unwrap()
            .is_none());
    }
}
