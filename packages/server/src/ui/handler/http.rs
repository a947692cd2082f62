//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    infrastructure::dto::http::{HealthDto, OnlineUsersDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<HealthDto> {
    Json(HealthDto { status: "ok" })
}

/// Currently online user ids
pub async fn online_users(State(state): State<Arc<AppState>>) -> Json<OnlineUsersDto> {
    Json(OnlineUsersDto {
        online_user_ids: state.manager.online_user_ids().await,
    })
}
