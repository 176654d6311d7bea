use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub users: u64,
    pub active_sessions: u64,
}

/// `GET /api/stats`: user counts from the external user store.
pub async fn summary(State(ctx): State<ApiContext>) -> Result<Json<StatsResponse>, ApiError> {
    let users = ctx
        .stats
        .count_users()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let active_sessions = ctx
        .stats
        .count_active_sessions(chrono::Utc::now())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(StatsResponse {
        users,
        active_sessions,
    }))
}
