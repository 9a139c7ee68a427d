// HTTP surface: WebSocket endpoint and health check

pub mod health;
pub mod websocket;

pub use health::create_health_router;
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Full application router.
pub fn create_router(state: WsAppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .merge(create_ws_router(Arc::clone(&state)))
        .merge(create_health_router(state))
        .layer(CorsLayer::permissive())
}
