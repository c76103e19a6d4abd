//! Router-level test harness backed by the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::db::models::{Tag, UserId};
use crate::db::MemoryStore;
use crate::state::AppState;

/// Default settings with a bcrypt cost cheap enough for tests.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.bcrypt_cost = 4;
    config
}

pub struct Session {
    pub user_id: UserId,
    pub token: String,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::new(Arc::new(MemoryStore::new()), test_config());
        let router = crate::create_app(state.clone());
        Self { state, router }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(
        &self,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, body).await
    }

    /// Registers `<username>@example.com` with password `secret1`.
    pub async fn register(&self, username: &str) -> Session {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "secret1",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        Session {
            user_id: body["userId"].as_i64().unwrap(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn create_tag(&self, name: &str) -> Tag {
        self.state.store().create_tag(name).await.unwrap()
    }

    /// Creates a post through the API and returns its id.
    pub async fn create_post(&self, session: &Session, title: &str, tags: &[i64]) -> i64 {
        let (status, body) = self
            .post(
                "/posts",
                Some(&session.token),
                json!({
                    "title": title,
                    "video_url": "https://youtu.be/dQw4w9WgXcQ",
                    "description": "",
                    "user_id": session.user_id,
                    "instructor_name": "adriene",
                    "tags": tags,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create post failed: {body}");
        body["id"].as_i64().unwrap()
    }
}
