//! Identity and sessions
//!
//! - **oauth**: the `IdentityProvider` seam and its HTTP implementation
//! - **session**: `SessionClient`, current user / sign-in / sign-out by token
//! - **extract**: axum extractors for the token and the signed-in user

pub mod error;
pub mod extract;
pub mod oauth;
pub mod session;

pub use error::AuthError;
pub use extract::{
    auth_cookie, expired_cookie, CurrentUser, MaybeUser, SessionToken, OAUTH_STATE_COOKIE,
    SESSION_COOKIE,
};
pub use oauth::{IdentityProvider, OAuthClient, OAuthConfig};
pub use session::SessionClient;
