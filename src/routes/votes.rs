/**
 * Vote Routes
 * One signed vote per (user, post) and the live score built from them
 */
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::db::models::{PostId, UserId, UserVote, Vote};
use crate::error::AppError;
use crate::routes::auth::AuthUser;
use crate::routes::extract::{AppJson, AppPath};
use crate::state::AppState;
use crate::vote::VoteValue;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub post_id: Option<PostId>,
    /// Defaults to the authenticated user
    pub user_id: Option<UserId>,
    /// 1, -1 or 0 (0 removes the vote)
    pub value: Option<i64>,
    /// Treat `value` as the arrow the user clicked and apply the toggle
    /// policy against their current vote.
    #[serde(default)]
    pub toggle: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractVoteRequest {
    pub post_id: Option<PostId>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub message: String,
    /// `None` when the request left the user without a vote
    pub vote: Option<Vote>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub score: i64,
}

fn acting_user(auth: &AuthUser, user_id: Option<UserId>) -> Result<UserId, AppError> {
    let user_id = user_id.unwrap_or(auth.user_id);
    auth.ensure_is(user_id)?;
    Ok(user_id)
}

fn required_post(post_id: Option<PostId>) -> Result<PostId, AppError> {
    post_id.ok_or_else(|| AppError::Validation("Post ID is required".to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /vote
pub async fn cast_vote(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<CastVoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let user_id = acting_user(&auth, payload.user_id)?;
    let post_id = required_post(payload.post_id)?;
    let raw = payload
        .value
        .ok_or_else(|| AppError::Validation("Vote value is required".to_string()))?;
    let value = VoteValue::try_from(raw).map_err(|e| AppError::Validation(e.to_string()))?;

    let store = state.store();
    let vote = if payload.toggle {
        store.toggle_vote(user_id, post_id, value).await
    } else {
        store.cast_vote(user_id, post_id, value).await
    }
    .map_err(|e| AppError::from_store(e, "Post"))?;

    let message = match &vote {
        Some(v) => {
            tracing::info!(user_id, post_id, value = v.value, "vote cast");
            "Vote recorded"
        }
        None => {
            tracing::info!(user_id, post_id, "vote cleared");
            "Vote removed"
        }
    };

    Ok(Json(VoteResponse {
        message: message.to_string(),
        vote,
    }))
}

/// GET /vote/{user_id}
pub async fn user_votes(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(user_id): AppPath<UserId>,
) -> Result<Json<Vec<UserVote>>, AppError> {
    auth.ensure_is(user_id)?;
    Ok(Json(state.store().user_votes(user_id).await?))
}

/// GET /vote/post/{post_id}
/// Live sum of the post's votes; 0 when it has none, including unknown or
/// deleted posts.
pub async fn post_score(
    State(state): State<AppState>,
    AppPath(post_id): AppPath<PostId>,
) -> Result<Json<ScoreResponse>, AppError> {
    let score = state.store().post_score(post_id).await?;
    Ok(Json(ScoreResponse { score }))
}

/// DELETE /vote
pub async fn retract_vote(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<RetractVoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let user_id = acting_user(&auth, payload.user_id)?;
    let post_id = required_post(payload.post_id)?;

    state
        .store()
        .retract_vote(user_id, post_id)
        .await
        .map_err(|e| AppError::from_store(e, "Vote"))?;

    tracing::info!(user_id, post_id, "vote retracted");

    Ok(Json(VoteResponse {
        message: "Vote removed".to_string(),
        vote: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Session, TestApp};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn vote(app: &TestApp, who: &Session, post_id: i64, value: i64) -> (StatusCode, Value) {
        app.post(
            "/vote",
            Some(&who.token),
            json!({"postId": post_id, "userId": who.user_id, "value": value}),
        )
        .await
    }

    async fn score(app: &TestApp, post_id: i64) -> i64 {
        let (status, body) = app.get(&format!("/vote/post/{post_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        body["score"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_score_is_sum_of_votes() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let carol = app.register("carol").await;
        let post_id = app.create_post(&alice, "one", &[]).await;

        assert_eq!(score(&app, post_id).await, 0);
        vote(&app, &alice, post_id, 1).await;
        vote(&app, &bob, post_id, 1).await;
        vote(&app, &carol, post_id, -1).await;
        assert_eq!(score(&app, post_id).await, 1);
    }

    #[tokio::test]
    async fn test_revote_overwrites_and_zero_clears() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let post_id = app.create_post(&alice, "one", &[]).await;

        let (status, body) = vote(&app, &alice, post_id, 1).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vote"]["value"], 1);

        vote(&app, &alice, post_id, -1).await;
        assert_eq!(score(&app, post_id).await, -1);

        let (_, votes) = app.get(&format!("/vote/{}", alice.user_id), Some(&alice.token)).await;
        assert_eq!(votes, json!([{"postId": post_id, "value": -1}]));

        let (status, body) = vote(&app, &alice, post_id, 0).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["vote"].is_null());
        assert_eq!(score(&app, post_id).await, 0);

        // Clearing again is still fine.
        let (status, _) = vote(&app, &alice, post_id, 0).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_vote_value() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let post_id = app.create_post(&alice, "one", &[]).await;

        let (status, body) = vote(&app, &alice, post_id, 2).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid vote value. Must be 1, -1 or 0.");
        assert_eq!(score(&app, post_id).await, 0);

        let (status, body) = app
            .post("/vote", Some(&alice.token), json!({"value": 1}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Post ID is required");
    }

    #[tokio::test]
    async fn test_vote_on_missing_post() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let (status, body) = vote(&app, &alice, 777, 1).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Post not found");

        let (status, body) = app.get("/vote/post/777", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"score": 0}));
    }

    #[tokio::test]
    async fn test_deleted_post_leaves_no_score() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let post_id = app.create_post(&alice, "one", &[]).await;
        vote(&app, &alice, post_id, 1).await;
        vote(&app, &bob, post_id, 1).await;
        assert_eq!(score(&app, post_id).await, 2);

        let (status, _) = app
            .delete(&format!("/posts/{post_id}"), Some(&alice.token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app.get(&format!("/vote/post/{post_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"score": 0}));
    }

    #[tokio::test]
    async fn test_cannot_vote_as_someone_else() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let post_id = app.create_post(&alice, "one", &[]).await;

        let (status, _) = app
            .post(
                "/vote",
                Some(&bob.token),
                json!({"postId": post_id, "userId": alice.user_id, "value": 1}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .post("/vote", None, json!({"postId": post_id, "value": 1}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_toggle_clicks() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let post_id = app.create_post(&alice, "one", &[]).await;
        let click = |value: i64| {
            json!({"postId": post_id, "value": value, "toggle": true})
        };

        app.post("/vote", Some(&alice.token), click(1)).await;
        assert_eq!(score(&app, post_id).await, 1);

        app.post("/vote", Some(&alice.token), click(-1)).await;
        assert_eq!(score(&app, post_id).await, -1);

        let (_, body) = app.post("/vote", Some(&alice.token), click(-1)).await;
        assert!(body["vote"].is_null());
        assert_eq!(score(&app, post_id).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_toggle_clicks_alternate() {
        let app = std::sync::Arc::new(TestApp::new());
        let alice = app.register("alice").await;
        let post_id = app.create_post(&alice, "one", &[]).await;
        let body = json!({"postId": post_id, "value": 1, "toggle": true});

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let app = std::sync::Arc::clone(&app);
                let token = alice.token.clone();
                let body = body.clone();
                tokio::spawn(async move { app.post("/vote", Some(&token), body).await.0 })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::OK);
        }

        // An even number of clicks on the same arrow ends where it started.
        assert_eq!(score(&app, post_id).await, 0);
    }

    #[tokio::test]
    async fn test_retract_then_retract_again() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let post_id = app.create_post(&alice, "one", &[]).await;
        vote(&app, &alice, post_id, 1).await;

        let body = json!({"postId": post_id, "userId": alice.user_id});
        let (status, response) = app.delete("/vote", Some(&alice.token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "Vote removed");
        assert_eq!(score(&app, post_id).await, 0);

        let (status, response) = app.delete("/vote", Some(&alice.token), Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response["error"], "Vote not found");
    }
}
