use super::WsAppState;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
}

/// GET /health
pub async fn health(State(state): State<Arc<WsAppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.hub.connection_count(),
    })
}

pub fn create_health_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}
