use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/admin",
    tag = "sse",
    responses((status = 200, description = "Admin SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream state changes, player connectivity and swap outcomes to admin frontends.
pub async fn admin_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (events, updates) = sse_service::subscribe_admin(&state);
    info!("admin stream subscribed");
    sse_service::to_sse_stream(events, updates)
}

/// Admin event stream.
pub fn router() -> Router<SharedState> {
    Router::new().route("/sse/admin", get(admin_stream))
}
