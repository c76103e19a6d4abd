use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::StoreError;
use crate::ranking::QueryError;

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// Duplicate of a uniquely keyed record.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a storage failure, naming the record it concerned.
    pub fn from_store(err: StoreError, what: &str) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound(format!("{what} not found")),
            StoreError::Conflict => AppError::Conflict(format!("{what} already exists")),
            other => other.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("Not found".to_string()),
            StoreError::Conflict => AppError::Conflict("Already exists".to_string()),
            StoreError::InvalidReference(msg) => AppError::Validation(msg),
            StoreError::Database(e) => {
                tracing::error!(error = %e, "store operation failed");
                AppError::Internal
            }
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_bad_request() {
        let err = AppError::from_store(StoreError::Conflict, "Bookmark");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Bookmark already exists");
    }

    #[test]
    fn test_database_error_hides_detail() {
        let err: AppError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_invalid_reference_is_validation_error() {
        let err: AppError = StoreError::InvalidReference("Unknown tag id 9".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Unknown tag id 9");
    }
}
