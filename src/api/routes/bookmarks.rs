//! Bookmark Routes
//!
//! JSON surface used by the dashboard script and the CLI. Every handler
//! requires a session and only ever touches the caller's own rows.
//!
//! - GET /api/v1/me
//! - GET /api/v1/bookmarks
//! - POST /api/v1/bookmarks
//! - DELETE /api/v1/bookmarks/:id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::{BookmarkListResponse, CreateBookmarkRequest, UserResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::CurrentUser;
use crate::storage::Bookmark;

/// GET /api/v1/me
pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

/// GET /api/v1/bookmarks
///
/// The caller's bookmarks, newest first.
pub async fn list_bookmarks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<BookmarkListResponse>> {
    let bookmarks = state.store.list_bookmarks(user.id).await?;
    Ok(Json(bookmarks.into()))
}

/// POST /api/v1/bookmarks
///
/// Insert a bookmark owned by the caller. A body naming another `user_id`
/// is refused.
pub async fn create_bookmark(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreateBookmarkRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Bookmark>)> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    if let Some(claimed) = request.user_id {
        if claimed != user.id {
            return Err(ApiError::Forbidden(
                "bookmarks can only be created for the signed-in user".to_string(),
            ));
        }
    }

    let bookmark = state
        .create_bookmark(&user, request.into_new_bookmark())
        .await?;
    Ok((StatusCode::CREATED, Json(bookmark)))
}

/// DELETE /api/v1/bookmarks/:id
///
/// 404 when the id is unknown or belongs to someone else.
pub async fn delete_bookmark(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.delete_bookmark(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
