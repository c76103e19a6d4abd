/**
 * Authentication Routes
 * Registration, login and bearer-credential verification
 */
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::db::models::{NewUser, User, UserId};
use crate::error::AppError;
use crate::routes::extract::AppJson;
use crate::state::AppState;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"\S+@\S+\.\S+").expect("email pattern is valid");
}

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID
    pub exp: i64,
    pub iat: i64,
}

/// User info returned to the client (no credential hash)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Returned by both register and login
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: UserId,
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
}

// ============================================================================
// Tokens
// ============================================================================

pub fn create_access_token(
    user_id: UserId,
    config: &AuthConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::minutes(config.token_ttl_minutes)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(
    token: &str,
    config: &AuthConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn user_id_from(headers: &HeaderMap, config: &AuthConfig) -> Result<UserId, AppError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Token is required".to_string()))?;

    let claims = verify_access_token(token, config).map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))
}

// ============================================================================
// Session extractor
// ============================================================================

/// The authenticated caller. Handlers that take it reject requests without
/// a valid bearer credential; `Option<AuthUser>` admits anonymous callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
}

impl AuthUser {
    /// Rejects attempts to act on another user's behalf.
    pub fn ensure_is(&self, user_id: UserId) -> Result<(), AppError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Cannot act on behalf of another user".to_string(),
            ))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let user_id = user_id_from(&parts.headers, &state.config.auth)?;
        Ok(AuthUser { user_id })
    }
}

impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, AppError> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }
        let user_id = user_id_from(&parts.headers, &state.config.auth)?;
        Ok(Some(AuthUser { user_id }))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Runs CPU-bound bcrypt work on the blocking pool. A panicked task is a 500.
async fn off_executor<T, F>(what: &'static str, work: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        tracing::error!("spawn_blocking panic during {}: {}", what, e);
        AppError::Internal
    })
}

fn session_for(user: User, config: &AuthConfig) -> Result<SessionResponse, AppError> {
    let token = create_access_token(user.id, config).map_err(|e| {
        tracing::error!("Failed to create access token: {}", e);
        AppError::Internal
    })?;
    Ok(SessionResponse {
        user_id: user.id,
        token,
        user: user.into(),
    })
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_string();

    if username.chars().count() < 3 {
        return Err(AppError::Validation(
            "Username must be at least 3 characters long.".to_string(),
        ));
    }
    if !EMAIL_REGEX.is_match(&email) {
        return Err(AppError::Validation(
            "Please provide a valid email address.".to_string(),
        ));
    }
    if payload.password.chars().count() < 6 {
        return Err(AppError::Validation(
            "Password must be at least 6 characters long.".to_string(),
        ));
    }

    let store = state.store();
    if store.find_user_by_username(&username).await?.is_some() {
        return Err(AppError::Conflict("Username is already taken.".to_string()));
    }
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "User with this email already exists.".to_string(),
        ));
    }

    let cost = state.config.auth.bcrypt_cost;
    let password = payload.password;
    let password_hash = off_executor("hash", move || hash(password, cost))
        .await?
        .map_err(|e| {
            tracing::error!("Failed to hash password: {}", e);
            AppError::Internal
        })?;

    let user = store
        .create_user(NewUser {
            username,
            email,
            password_hash,
        })
        .await
        .map_err(|e| AppError::from_store(e, "User"))?;

    tracing::info!(user_id = user.id, "user registered");

    Ok((StatusCode::CREATED, Json(session_for(user, &state.config.auth)?)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = match state.store().find_user_by_email(payload.email.trim()).await? {
        Some(user) => user,
        None => {
            tracing::warn!("Login attempt for unknown email");
            return Err(invalid());
        }
    };

    let password = payload.password;
    let password_hash = user.password_hash.clone();
    let password_ok =
        off_executor("verify", move || verify(password, &password_hash).unwrap_or(false)).await?;
    if !password_ok {
        tracing::warn!(user_id = user.id, "Failed login attempt");
        return Err(invalid());
    }

    tracing::info!(user_id = user.id, "Successful login");

    Ok(Json(session_for(user, &state.config.auth)?))
}

/// POST /auth/verify
/// Lets a client rehydrate its stored session on startup.
/// A credential for a user that no longer exists is not valid.
pub async fn verify_token(State(state): State<AppState>, headers: HeaderMap) -> Json<VerifyResponse> {
    let invalid = VerifyResponse {
        valid: false,
        user_id: None,
    };
    let Ok(user_id) = user_id_from(&headers, &state.config.auth) else {
        return Json(invalid);
    };

    match state.store().find_user(user_id).await {
        Ok(Some(user)) => Json(VerifyResponse {
            valid: true,
            user_id: Some(user.id),
        }),
        Ok(None) => Json(invalid),
        Err(e) => {
            tracing::error!("Failed to look up user during verify: {}", e);
            Json(invalid)
        }
    }
}

/// POST /auth/logout
/// Credentials are stateless; the client discards its session.
pub async fn logout() -> Json<LogoutResponse> {
    Json(LogoutResponse { success: true })
}
