/**
 * Favorites Routes
 * A user's bookmarked posts ("collection")
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::db::models::{BookmarkEntry, PostId, UserId};
use crate::db::StoreError;
use crate::error::AppError;
use crate::routes::auth::AuthUser;
use crate::routes::extract::{AppJson, AppPath};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddFavoriteRequest {
    pub post_id: Option<PostId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /favorites/{user_id}
pub async fn list_favorites(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(user_id): AppPath<UserId>,
) -> Result<Json<Vec<BookmarkEntry>>, AppError> {
    auth.ensure_is(user_id)?;
    Ok(Json(state.store().list_bookmarks(user_id).await?))
}

/// POST /favorites/{user_id}
/// Not idempotent: bookmarking the same post twice is a 400.
pub async fn add_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(user_id): AppPath<UserId>,
    AppJson(payload): AppJson<AddFavoriteRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.ensure_is(user_id)?;
    let post_id = payload
        .post_id
        .ok_or_else(|| AppError::Validation("Post ID is required".to_string()))?;

    let bookmark = state
        .store()
        .add_bookmark(user_id, post_id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => AppError::NotFound("Post not found".to_string()),
            other => AppError::from_store(other, "Bookmark"),
        })?;

    tracing::info!(user_id, post_id, "bookmark added");

    Ok((StatusCode::CREATED, Json(bookmark)))
}

/// DELETE /favorites/{user_id}/{post_id}
pub async fn remove_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((user_id, post_id)): AppPath<(UserId, PostId)>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.ensure_is(user_id)?;

    state
        .store()
        .remove_bookmark(user_id, post_id)
        .await
        .map_err(|e| AppError::from_store(e, "Bookmark"))?;

    tracing::info!(user_id, post_id, "bookmark removed");

    Ok(Json(MessageResponse {
        message: "Bookmark deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use serde_json::json;

    #[tokio::test]
    async fn test_bookmark_lifecycle() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let post_id = app.create_post(&alice, "one", &[]).await;
        let uri = format!("/favorites/{}", alice.user_id);

        let (status, body) = app
            .post(&uri, Some(&alice.token), json!({"post_id": post_id}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["post_id"], post_id);
        assert_eq!(body["user_id"], alice.user_id);

        let (status, body) = app
            .post(&uri, Some(&alice.token), json!({"post_id": post_id}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bookmark already exists");

        let (status, body) = app.get(&uri, Some(&alice.token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["post"]["title"], "one");
        assert_eq!(body[0]["post"]["instructor"]["name"], "ADRIENE");

        let (status, body) = app
            .delete(&format!("{uri}/{post_id}"), Some(&alice.token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Bookmark deleted");

        let (status, body) = app
            .delete(&format!("{uri}/{post_id}"), Some(&alice.token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Bookmark not found");
    }

    #[tokio::test]
    async fn test_bookmark_requires_post_id_and_existing_post() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let uri = format!("/favorites/{}", alice.user_id);

        let (status, body) = app.post(&uri, Some(&alice.token), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Post ID is required");

        let (status, body) = app
            .post(&uri, Some(&alice.token), json!({"post_id": 4242}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Post not found");
    }

    #[tokio::test]
    async fn test_cannot_touch_another_users_favorites() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let post_id = app.create_post(&alice, "one", &[]).await;

        let uri = format!("/favorites/{}", alice.user_id);
        let (status, _) = app
            .post(&uri, Some(&bob.token), json!({"post_id": post_id}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.get(&uri, Some(&bob.token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
