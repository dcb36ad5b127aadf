//! Session client
//!
//! The current user is always resolved from an explicit token; nothing here
//! keeps a "logged in" flag around between calls.

use chrono::Duration;

use super::error::AuthError;
use crate::storage::{ProviderIdentity, Session, Store, User};

#[derive(Clone)]
pub struct SessionClient {
    store: Store,
    ttl: Duration,
}

impl SessionClient {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// The signed-in user for `token`, or `None` when absent, unknown or expired.
    ///
    /// A storage failure is an `Err`, distinct from "nobody".
    pub async fn current_user(&self, token: Option<&str>) -> Result<Option<User>, AuthError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        Ok(self.store.session_user(token).await?)
    }

    /// Create or refresh the account for `identity` and open a session
    pub async fn sign_in(&self, identity: ProviderIdentity) -> Result<Session, AuthError> {
        let user = self.store.upsert_user(identity).await?;
        let session = self.store.create_session(user.id, self.ttl).await?;

        tracing::info!(user_id = %user.id, "User signed in");
        Ok(session)
    }

    /// End the session. Unknown tokens are fine.
    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        if self.store.delete_session(token).await? {
            tracing::info!("User signed out");
        }
        Ok(())
    }
}
