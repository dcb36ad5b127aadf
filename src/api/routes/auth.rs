//! Auth Routes
//!
//! - POST /auth/sign-in - start the OAuth flow
//! - GET /auth/callback - finish it and set the session cookie
//! - POST /auth/sign-out - end the session and close its live sockets
//!
//! Every failure ends with a redirect to `/`; the details go to the log.

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::CallbackQuery;
use crate::api::state::AppState;
use crate::auth::{
    auth_cookie, expired_cookie, AuthError, SessionToken, OAUTH_STATE_COOKIE, SESSION_COOKIE,
};

/// POST /auth/sign-in
pub async fn sign_in(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let nonce = Uuid::new_v4().simple().to_string();
    let url = state
        .identity
        .authorize_url(&nonce, &state.config.redirect_uri());

    let jar = jar.add(auth_cookie(
        OAUTH_STATE_COOKIE,
        nonce,
        state.config.secure_cookies,
    ));
    (jar, Redirect::to(&url))
}

/// GET /auth/callback
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(expired_cookie(OAUTH_STATE_COOKIE));

    match complete_sign_in(&state, query, expected).await {
        Ok(token) => {
            let jar = jar.add(auth_cookie(
                SESSION_COOKIE,
                token,
                state.config.secure_cookies,
            ));
            (jar, Redirect::to("/dashboard"))
        }
        Err(e) => {
            tracing::error!(error = %e, "OAuth callback failed");
            (jar, Redirect::to("/"))
        }
    }
}

async fn complete_sign_in(
    state: &AppState,
    query: CallbackQuery,
    expected_state: Option<String>,
) -> Result<String, AuthError> {
    if let Some(error) = query.error {
        return Err(AuthError::Provider(error));
    }

    match (query.state, expected_state) {
        (Some(got), Some(expected)) if got == expected => {}
        _ => return Err(AuthError::StateMismatch),
    }

    let code = query
        .code
        .ok_or_else(|| AuthError::Provider("callback without code".to_string()))?;

    let identity = state
        .identity
        .exchange_code(&code, &state.config.redirect_uri())
        .await?;
    let session = state.sessions.sign_in(identity).await?;
    Ok(session.token)
}

/// POST /auth/sign-out
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    token: SessionToken,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(token) = token.as_deref() {
        if let Err(e) = state.sessions.sign_out(token).await {
            tracing::error!(error = %e, "Sign-out failed");
        }
        state.hub.disconnect_session(token).await;
    }

    (jar.remove(expired_cookie(SESSION_COOKIE)), Redirect::to("/"))
}
