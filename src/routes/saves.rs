use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::get,
};

use crate::{
    dto::admin::InstanceSummary, error::AppError, services::save_service, state::SharedState,
};

/// Optional content hash recorded alongside an upload.
pub const SAVE_HASH_HEADER: &str = "x-save-hash";

/// Save artifact transfer between clients.
pub fn router() -> Router<SharedState> {
    Router::new().route("/saves/{id}", get(download_save).put(upload_save))
}

/// Store a save artifact and mark its instance ready.
#[utoipa::path(
    put,
    path = "/saves/{id}",
    tag = "saves",
    params(
        ("id" = String, Path, description = "Instance identifier"),
        ("x-save-hash" = Option<String>, Header, description = "Content hash recorded with the save")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Save stored", body = InstanceSummary),
        (status = 404, description = "Unknown instance")
    )
)]
pub async fn upload_save(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InstanceSummary>, AppError> {
    let hash = headers
        .get(SAVE_HASH_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty());
    let instance = save_service::upload(&state, &id, &body, hash).await?;
    let holder = state
        .store()
        .read(|s| s.holder_of(&instance.id).map(str::to_string))
        .await;
    Ok(Json(InstanceSummary {
        id: instance.id,
        game: instance.game,
        file_state: instance.file_state,
        save: instance.save,
        pending_player: instance.pending_player,
        holder,
    }))
}

/// Fetch a save artifact, waiting for a pending hand-off to land.
#[utoipa::path(
    get,
    path = "/saves/{id}",
    tag = "saves",
    params(("id" = String, Path, description = "Instance identifier")),
    responses(
        (status = 200, description = "Save bytes", content_type = "application/octet-stream", body = Vec<u8>),
        (status = 404, description = "Unknown instance"),
        (status = 504, description = "Save not ready in time")
    )
)]
pub async fn download_save(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = save_service::download(&state, &id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}
