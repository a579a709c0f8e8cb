use axum::{extract::State, response::IntoResponse, Json};

use crate::modules::quota;
use crate::proxy::server::AppState;

/// `GET /api/subscription`
pub async fn handle_get_subscription(State(state): State<AppState>) -> impl IntoResponse {
    Json(quota::snapshot(&state.orchestrator.current_state()))
}

/// `POST /api/subscription/upgrade`
pub async fn handle_upgrade(State(state): State<AppState>) -> impl IntoResponse {
    let upgraded = state.orchestrator.upgrade();
    tracing::info!("Subscription upgraded to premium");
    Json(quota::snapshot(&upgraded))
}

/// `POST /api/subscription/downgrade`
pub async fn handle_downgrade(State(state): State<AppState>) -> impl IntoResponse {
    let downgraded = state.orchestrator.downgrade();
    tracing::info!("Subscription downgraded to free");
    Json(quota::snapshot(&downgraded))
}
