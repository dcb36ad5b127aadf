//! Bookmark creation form
//!
//! Holds the two input fields and the in-flight flag. Submitting sends an
//! insert; the new row shows up in the list through the realtime echo, not
//! through this component.

use uuid::Uuid;

use super::api::BookmarkRemote;
use crate::api::dto::CreateBookmarkRequest;
use crate::storage::Bookmark;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A field was blank; nothing was sent
    Skipped,
    Created(Bookmark),
    /// The insert failed and was logged; the fields are kept
    Failed,
}

#[derive(Debug, Clone)]
pub struct BookmarkForm {
    pub user_id: Uuid,
    pub url: String,
    pub title: String,
    submitting: bool,
}

impl BookmarkForm {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            url: String::new(),
            title: String::new(),
            submitting: false,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub async fn submit(&mut self, remote: &dyn BookmarkRemote) -> SubmitOutcome {
        if self.url.trim().is_empty() || self.title.trim().is_empty() {
            return SubmitOutcome::Skipped;
        }

        self.submitting = true;
        let result = remote
            .insert(CreateBookmarkRequest {
                url: self.url.clone(),
                title: self.title.clone(),
                user_id: Some(self.user_id),
            })
            .await;
        self.submitting = false;

        match result {
            Ok(bookmark) => {
                self.url.clear();
                self.title.clear();
                SubmitOutcome::Created(bookmark)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error adding bookmark");
                SubmitOutcome::Failed
            }
        }
    }
}
