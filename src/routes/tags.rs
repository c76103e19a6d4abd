//! Tag catalog.

use axum::{extract::State, Json};

use crate::db::models::Tag;
use crate::error::AppError;
use crate::state::AppState;

/// GET /tags
/// All tags ordered by name, with their popularity counters.
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(state.store().list_tags().await?))
}
