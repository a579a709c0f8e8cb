use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};

use crate::proxy::common::error::GatewayError;
use crate::proxy::server::AppState;

/// `GET /healthz`: the gateway itself is up
pub async fn handle_liveness() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

/// `GET /api/backend/health`: passthrough of the backend's own health body
pub async fn handle_backend_health(State(state): State<AppState>) -> Response {
    let Some(gateway) = state.gateway.as_ref() else {
        return GatewayError::Configuration("BACKEND_URL not set".to_string()).into_response();
    };

    match gateway.health().await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::warn!("Backend health check failed: {}", e);
            e.into_response()
        }
    }
}
