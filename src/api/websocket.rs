use crate::dispatch::Dispatcher;
use crate::service::Services;
use crate::subscription::{ConnectionManager, Hub};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state for the WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub services: Services,
    pub dispatcher: Arc<Dispatcher>,
    pub hub: Arc<Hub>,
}

impl WsAppState {
    /// State with every command type wired to `services`.
    pub fn new(services: Services, broadcast_capacity: usize) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::with_services(&services)),
            hub: Arc::new(Hub::new(broadcast_capacity)),
            services,
        }
    }
}

/// GET /api/ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsAppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>) {
    // Register before the snapshot is taken so no event falls in between
    let connection = state.hub.connect();
    let connection_id = connection.id;

    let manager = ConnectionManager::new(state.services.clone(), Arc::clone(&state.dispatcher));
    manager.handle(socket, connection).await;

    state.hub.disconnect(connection_id);
}
