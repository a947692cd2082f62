//! WebSocket upgrade endpoint.
//!
//! The session is validated once here; the direct-message handler
//! re-validates it on every send.

use std::sync::Arc;

use axum::{
    extract::{Query, State, ws::WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header::COOKIE},
    response::Response,
};
use serde::Deserialize;

use crate::{
    realtime::{ClientIdentity, RealtimeError},
    ui::state::AppState,
};

pub const SESSION_COOKIE: &str = "session_token";

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let Some(token) = session_token(&headers, query.token) else {
        tracing::warn!("WebSocket upgrade without a session token");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let user = match state.store.validate_session(&token).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("WebSocket upgrade with an invalid session token");
            return Err(StatusCode::UNAUTHORIZED);
        }
        Err(e) => {
            tracing::error!("Failed to validate session: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let identity = ClientIdentity {
        user_id: user.id,
        display_name: user.display_name,
        session_token: token,
    };
    state
        .manager
        .upgrade_connection(ws, &headers, identity)
        .map_err(|e| {
            tracing::warn!(user_id = %user.id, "Rejected WebSocket upgrade: {}", e);
            match e {
                RealtimeError::Protocol(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        })
}

/// The `session_token` cookie wins over the `token` query parameter.
fn session_token(headers: &HeaderMap, query_token: Option<String>) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .or(query_token)
        .filter(|token| !token.is_empty())
}
