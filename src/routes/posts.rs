/**
 * Post Routes
 * Listing, retrieval and owner-only mutation of video posts
 */
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::models::{NewPost, Post, PostChanges, PostId, PostScope, TagId, UserId};
use crate::db::normalize_instructor_name;
use crate::error::AppError;
use crate::ranking::{self, parse_tag_filter, RankedPost, SortOrder, Viewer};
use crate::routes::auth::AuthUser;
use crate::routes::extract::{AppJson, AppPath, AppQuery};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters shared by GET /posts and GET /collection
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Comma-separated tag ids
    pub tags: Option<String>,
    pub sort: Option<String>,
    /// Restrict to posts owned by this user
    pub user_id: Option<UserId>,
}

impl ListQuery {
    fn filters(&self) -> Result<(Vec<TagId>, SortOrder), AppError> {
        let tag_ids = parse_tag_filter(self.tags.as_deref())?;
        let sort = match self.sort.as_deref() {
            Some(raw) => raw.parse::<SortOrder>()?,
            None => SortOrder::default(),
        };
        Ok((tag_ids, sort))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub video_url: String,
    pub description: Option<String>,
    /// Defaults to the authenticated user
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub instructor_name: String,
    #[serde(default)]
    pub tags: Vec<TagId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub video_url: Option<String>,
    pub description: Option<String>,
    pub instructor_name: Option<String>,
    pub user_id: Option<UserId>,
}

// ============================================================================
// Validation
// ============================================================================

fn required(value: &str, message: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::Validation(message.to_string()))
    } else {
        Ok(value.to_string())
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn dedupe(tag_ids: Vec<TagId>) -> Vec<TagId> {
    let mut seen = Vec::with_capacity(tag_ids.len());
    for id in tag_ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

async fn owned_post(state: &AppState, id: PostId, auth: &AuthUser) -> Result<Post, AppError> {
    let post = state
        .store()
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    if post.user.id != auth.user_id {
        return Err(AppError::Forbidden(
            "Only the owner can modify this post".to_string(),
        ));
    }
    Ok(post)
}

async fn ranked(state: &AppState, post: Post, viewer_id: Option<UserId>) -> Result<RankedPost, AppError> {
    let store = state.store();
    let score = store.post_score(post.id).await?;
    let viewer = match viewer_id {
        Some(user_id) => Some(Viewer::load(store, user_id).await?),
        None => None,
    };
    Ok(RankedPost::new(post, score, viewer.as_ref()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /posts
pub async fn list_posts(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    AppQuery(query): AppQuery<ListQuery>,
) -> Result<Json<Vec<RankedPost>>, AppError> {
    let (tag_ids, sort) = query.filters()?;
    let scope = query.user_id.map_or(PostScope::All, PostScope::OwnedBy);

    let posts = ranking::list_posts(
        state.store(),
        scope,
        &tag_ids,
        sort,
        auth.map(|a| a.user_id),
    )
    .await?;
    Ok(Json(posts))
}

/// GET /collection
/// The viewer's bookmarked posts, filtered and ordered like GET /posts.
pub async fn list_collection(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(query): AppQuery<ListQuery>,
) -> Result<Json<Vec<RankedPost>>, AppError> {
    let (tag_ids, sort) = query.filters()?;

    let posts = ranking::list_posts(
        state.store(),
        PostScope::BookmarkedBy(auth.user_id),
        &tag_ids,
        sort,
        Some(auth.user_id),
    )
    .await?;
    Ok(Json(posts))
}

/// GET /posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    AppPath(id): AppPath<PostId>,
) -> Result<Json<RankedPost>, AppError> {
    let post = state
        .store()
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    Ok(Json(ranked(&state, post, auth.map(|a| a.user_id)).await?))
}

/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = payload.user_id.unwrap_or(auth.user_id);
    auth.ensure_is(user_id)?;

    let title = required(&payload.title, "Title is required")?;
    let video_url = required(&payload.video_url, "Video URL is required")?;
    let instructor_name = normalize_instructor_name(&required(
        &payload.instructor_name,
        "Instructor name is required",
    )?);

    let post = state
        .store()
        .create_post(NewPost {
            user_id,
            title,
            description: optional_text(payload.description),
            video_url,
            instructor_name,
            tag_ids: dedupe(payload.tags),
        })
        .await?;

    tracing::info!(user_id, post_id = post.id, tags = post.tags.len(), "post created");

    // A new post has no votes or bookmarks yet.
    let body = RankedPost::new(post, 0, Some(&Viewer::default()));
    Ok((StatusCode::CREATED, Json(body)))
}

/// PUT /posts/{id}
pub async fn update_post(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<PostId>,
    AppJson(payload): AppJson<UpdatePostRequest>,
) -> Result<Json<RankedPost>, AppError> {
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::Validation("User ID is required".to_string()))?;
    auth.ensure_is(user_id)?;

    let title = payload
        .title
        .as_deref()
        .map(|t| required(t, "Title cannot be empty"))
        .transpose()?;
    let video_url = payload
        .video_url
        .as_deref()
        .map(|u| required(u, "Video URL cannot be empty"))
        .transpose()?;
    let instructor_name = payload
        .instructor_name
        .as_deref()
        .map(|n| required(n, "Instructor name cannot be empty"))
        .transpose()?
        .map(|n| normalize_instructor_name(&n));

    owned_post(&state, id, &auth).await?;

    let post = state
        .store()
        .update_post(
            id,
            PostChanges {
                title,
                description: payload.description.map(|d| d.trim().to_string()),
                video_url,
                instructor_name,
            },
        )
        .await
        .map_err(|e| AppError::from_store(e, "Post"))?;

    tracing::info!(user_id, post_id = id, "post updated");

    Ok(Json(ranked(&state, post, Some(user_id)).await?))
}

/// DELETE /posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<PostId>,
) -> Result<StatusCode, AppError> {
    owned_post(&state, id, &auth).await?;

    state
        .store()
        .delete_post(id)
        .await
        .map_err(|e| AppError::from_store(e, "Post"))?;

    tracing::info!(user_id = auth.user_id, post_id = id, "post deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use serde_json::json;

    fn ids(body: &serde_json::Value) -> Vec<i64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        assert_eq!(dedupe(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_create_post_expands_and_normalizes() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let yoga = app.create_tag("yoga").await;
        let core = app.create_tag("core").await;

        let (status, body) = app
            .post(
                "/posts",
                Some(&alice.token),
                json!({
                    "title": "Morning flow",
                    "video_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                    "instructor_name": "  adriene ",
                    "tags": [yoga.id, core.id, yoga.id],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["instructor"]["name"], "ADRIENE");
        assert_eq!(body["user"]["username"], "alice");
        assert_eq!(body["embed_url"], "https://www.youtube.com/embed/dQw4w9WgXcQ");
        assert_eq!(
            body["video_url"],
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(body["tags"].as_array().unwrap().len(), 2);
        assert_eq!(body["score"], 0);

        let (_, tags) = app.get("/tags", None).await;
        for tag in tags.as_array().unwrap() {
            assert_eq!(tag["popularity"], 1);
        }
    }

    #[tokio::test]
    async fn test_create_post_validation() {
        let app = TestApp::new();
        let alice = app.register("alice").await;

        let (status, body) = app
            .post(
                "/posts",
                Some(&alice.token),
                json!({"title": " ", "video_url": "x", "instructor_name": "a"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title is required");

        let (status, _) = app
            .post(
                "/posts",
                Some(&alice.token),
                json!({"title": "t", "video_url": "x", "instructor_name": "a", "tags": [999]}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post(
                "/posts",
                None,
                json!({"title": "t", "video_url": "x", "instructor_name": "a"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_post_for_another_user_is_forbidden() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;

        let (status, _) = app
            .post(
                "/posts",
                Some(&alice.token),
                json!({"title": "t", "video_url": "x", "instructor_name": "a", "user_id": bob.user_id}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_list_filters_by_any_tag_and_owner() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let a = app.create_tag("a").await.id;
        let b = app.create_tag("b").await.id;
        let c = app.create_tag("c").await.id;

        let p1 = app.create_post(&alice, "one", &[a, b]).await;
        let p2 = app.create_post(&bob, "two", &[b]).await;
        let p3 = app.create_post(&alice, "three", &[c]).await;

        let (status, body) = app
            .get(&format!("/posts?tags={a},{c}&sort=oldest"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), [p1, p3]);

        let (_, body) = app.get("/posts", None).await;
        assert_eq!(ids(&body), [p3, p2, p1]);
        assert!(body[0].get("viewer").is_none());

        let (_, body) = app
            .get(&format!("/posts?user_id={}&sort=oldest", alice.user_id), None)
            .await;
        assert_eq!(ids(&body), [p1, p3]);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_query() {
        let app = TestApp::new();
        let (status, body) = app.get("/posts?sort=likes", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("likes"));

        let (status, _) = app.get("/posts?tags=1,x", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_popular_sort_and_viewer_annotation() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let p1 = app.create_post(&alice, "one", &[]).await;
        let p2 = app.create_post(&alice, "two", &[]).await;

        app.post(
            "/vote",
            Some(&bob.token),
            json!({"postId": p1, "userId": bob.user_id, "value": 1}),
        )
        .await;
        app.post(
            &format!("/favorites/{}", bob.user_id),
            Some(&bob.token),
            json!({"post_id": p2}),
        )
        .await;

        let (_, body) = app.get("/posts?sort=popular", Some(&bob.token)).await;
        assert_eq!(ids(&body), [p1, p2]);
        assert_eq!(body[0]["score"], 1);
        assert_eq!(body[0]["viewer"]["vote"], 1);
        assert_eq!(body[0]["viewer"]["bookmarked"], false);
        assert_eq!(body[1]["viewer"]["vote"], 0);
        assert_eq!(body[1]["viewer"]["bookmarked"], true);
    }

    #[tokio::test]
    async fn test_collection_is_bookmark_scoped() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let tag = app.create_tag("yoga").await.id;
        let p1 = app.create_post(&alice, "one", &[tag]).await;
        app.create_post(&alice, "two", &[tag]).await;
        app.post(
            &format!("/favorites/{}", alice.user_id),
            Some(&alice.token),
            json!({"post_id": p1}),
        )
        .await;

        let (status, body) = app
            .get(&format!("/collection?tags={tag}"), Some(&alice.token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), [p1]);

        let (status, _) = app.get("/collection", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_post_and_missing_post() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let id = app.create_post(&alice, "one", &[]).await;

        let (status, body) = app.get(&format!("/posts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "one");

        let (status, body) = app.get("/posts/9999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Post not found");
    }

    #[tokio::test]
    async fn test_update_requires_owner_and_user_id() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let id = app.create_post(&alice, "one", &[]).await;
        let uri = format!("/posts/{id}");

        let (status, body) = app
            .put(&uri, Some(&alice.token), json!({"title": "renamed"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "User ID is required");

        let (status, _) = app
            .put(&uri, Some(&bob.token), json!({"title": "x", "user_id": bob.user_id}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .put(
                &uri,
                Some(&alice.token),
                json!({"title": "renamed", "instructor_name": "yoga with bob", "user_id": alice.user_id}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "renamed");
        assert_eq!(body["instructor"]["name"], "YOGA WITH BOB");
    }

    #[tokio::test]
    async fn test_delete_cascades_votes_and_bookmarks() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let id = app.create_post(&alice, "one", &[]).await;

        app.post(
            "/vote",
            Some(&bob.token),
            json!({"postId": id, "value": -1}),
        )
        .await;
        app.post(
            &format!("/favorites/{}", bob.user_id),
            Some(&bob.token),
            json!({"post_id": id}),
        )
        .await;

        let (status, _) = app.delete(&format!("/posts/{id}"), Some(&bob.token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.delete(&format!("/posts/{id}"), Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (_, votes) = app.get(&format!("/vote/{}", bob.user_id), Some(&bob.token)).await;
        assert!(votes.as_array().unwrap().is_empty());
        let (_, favorites) = app
            .get(&format!("/favorites/{}", bob.user_id), Some(&bob.token))
            .await;
        assert!(favorites.as_array().unwrap().is_empty());

        let (status, _) = app.delete(&format!("/posts/{id}"), Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
