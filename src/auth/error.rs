//! Authentication errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::error::error_response;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AuthError {
    /// No session, or the session expired
    #[error("Not signed in")]
    Unauthenticated,

    /// OAuth `state` did not match the nonce we issued
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// The provider refused or returned something unusable
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("HTTP error talking to identity provider: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OAuth is not configured: {0}")]
    NotConfigured(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// HTTP status and error code for this failure
    pub fn status_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::StateMismatch => (StatusCode::BAD_REQUEST, "OAUTH_STATE_MISMATCH"),
            AuthError::Provider(_) | AuthError::Http(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            AuthError::NotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, "AUTH_NOT_CONFIGURED"),
            AuthError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_code();
        error_response(status, code, self.to_string())
    }
}
