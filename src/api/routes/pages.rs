//! Page Routes
//!
//! - GET / - landing page, or a redirect to the dashboard when signed in
//! - GET /dashboard - the signed-in user's bookmarks
//! - POST /bookmarks, POST /bookmarks/:id/delete - form posts for browsers
//!   without the dashboard script
//!
//! Pages never show an error state: failures are logged and the user is
//! redirected or sees an empty list.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::auth::MaybeUser;
use crate::storage::NewBookmark;

fn render(result: Result<String, tera::Error>) -> Response {
    match result {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /
pub async fn landing(State(state): State<Arc<AppState>>, MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    render(state.pages.landing())
}

/// GET /dashboard
pub async fn dashboard(State(state): State<Arc<AppState>>, MaybeUser(user): MaybeUser) -> Response {
    let Some(user) = user else {
        return Redirect::to("/").into_response();
    };

    let bookmarks = match state.store.list_bookmarks(user.id).await {
        Ok(bookmarks) => bookmarks,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to load bookmarks");
            Vec::new()
        }
    };

    render(state.pages.dashboard(&user, &bookmarks))
}

/// POST /bookmarks
pub async fn create_from_form(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Form(input): Form<NewBookmark>,
) -> Redirect {
    let Some(user) = user else {
        return Redirect::to("/");
    };

    if let Err(e) = state.create_bookmark(&user, input).await {
        tracing::error!(user_id = %user.id, error = %e, "Error adding bookmark");
    }
    Redirect::to("/dashboard")
}

/// POST /bookmarks/:id/delete
pub async fn delete_from_form(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<Uuid>,
) -> Redirect {
    let Some(user) = user else {
        return Redirect::to("/");
    };

    if let Err(e) = state.delete_bookmark(&user, id).await {
        tracing::error!(user_id = %user.id, bookmark_id = %id, error = %e, "Error deleting bookmark");
    }
    Redirect::to("/dashboard")
}
