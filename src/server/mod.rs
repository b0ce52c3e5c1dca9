//! Control API: REST mission management plus the WebSocket observer channel.

pub mod missions;
pub mod observer;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::events::EventFabric;
use crate::mission::MissionManager;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Mission lifecycle manager.
    pub manager: Arc<MissionManager>,
    /// In-process event multiplexer for observer sessions.
    pub fabric: Arc<EventFabric>,
    /// Tenant this deployment serves.
    pub tenant_id: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Build the control API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/missions", post(missions::create).get(missions::list))
        .route(
            "/missions/{id}",
            get(missions::get_one).delete(missions::remove),
        )
        .route("/missions/{id}/cancel", post(missions::cancel))
        .route("/missions/{id}/terminate", post(missions::terminate))
        .route("/missions/{id}/signal", post(missions::signal))
        .route("/missions/{id}/findings", get(missions::findings))
        .route("/ws", get(observer::websocket))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Liveness probe.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
