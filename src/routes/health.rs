/**
 * Health Routes
 * Liveness, store health and readiness checks
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::state::AppState;

// Track server start time for uptime calculation
lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Initialize the server start time
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn check_store(state: &AppState) -> ServiceCheck {
    match state.store().health_check().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!("Store health check failed: {}", e);
            ServiceCheck {
                status: "unhealthy".to_string(),
                response_time: None,
                error: Some("Store unavailable".to_string()),
            }
        }
    }
}

/// GET /health
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/database
pub async fn health_database(State(state): State<AppState>) -> impl IntoResponse {
    let check = check_store(&state).await;
    let status = if check.error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(check))
}

/// GET /health/ready
/// Ready once the store answers.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let check = check_store(&state).await;
    let is_ready = check.error.is_none();

    let response = ReadyResponse {
        status: if is_ready { "ready" } else { "not ready" }.to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
        database: check.status,
        reason: (!is_ready).then(|| "Store is not healthy".to_string()),
    };

    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
