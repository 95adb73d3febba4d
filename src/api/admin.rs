use axum::{extract::State, Json};
use std::sync::Arc;

use super::auth::AdminUser;
use super::error::ApiError;
use crate::db::{AdminOverview, HeatmapResponse, SurgeResponse, UserResponse};
use crate::AppState;

pub async fn overview(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<AdminOverview>, ApiError> {
    Ok(Json(state.admin.overview().await?))
}

pub async fn heatmap(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<HeatmapResponse>, ApiError> {
    Ok(Json(state.admin.heatmap().await?))
}

/// Current multiplier, public so clients can show it before booking
pub async fn surge(State(state): State<Arc<AppState>>) -> Result<Json<SurgeResponse>, ApiError> {
    Ok(Json(state.admin.surge().await?))
}

pub async fn users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.admin.users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
