use axum::Router;

use crate::state::SharedState;

/// Session control endpoints.
pub mod admin;
/// OpenAPI and Swagger UI.
pub mod docs;
/// Liveness endpoint.
pub mod health;
/// Save upload and download.
pub mod saves;
/// Admin event stream.
pub mod sse;
/// Client WebSocket upgrade.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(websocket::router())
        .merge(admin::router())
        .merge(saves::router());

    api_router.merge(docs::router()).with_state(state)
}
