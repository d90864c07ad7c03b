use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use validator::Validate;

use crate::{
    dto::admin::{
        ActionResponse, AddPlayerRequest, AssignAllRequest, CatalogRequest, IntervalRequest,
        IntervalResponse, MarkCompletedRequest, ModeResponse, PlayerSummary, PlayerSwapRequest,
        PlayerSwapResponse, SetModeRequest, StateResponse, SwapEnabledResponse, SwapResponse,
        ToggleSwapRequest,
    },
    error::AppError,
    services::admin_service,
    state::SharedState,
};

/// Operator endpoints for driving the swap session.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/admin/state", get(get_state))
        .route("/admin/players", post(add_player))
        .route("/admin/players/{name}", delete(remove_player))
        .route("/admin/players/{name}/swap", post(force_player_swap))
        .route("/admin/start", post(start_session))
        .route("/admin/pause", post(pause_session))
        .route("/admin/reset", post(reset_session))
        .route("/admin/saves/clear", post(clear_saves))
        .route("/admin/swap", post(trigger_swap))
        .route("/admin/swap/toggle", post(toggle_swap))
        .route("/admin/swap/assign-all", post(assign_all))
        .route("/admin/mode", get(get_mode).put(set_mode))
        .route("/admin/interval", get(get_interval).put(set_interval))
        .route("/admin/completed", post(mark_completed))
        .route("/admin/catalog", put(update_catalog))
        .route("/admin/instances/{id}", delete(remove_instance))
}

/// Full session snapshot.
#[utoipa::path(
    get,
    path = "/admin/state",
    tag = "admin",
    responses((status = 200, description = "Current session state", body = StateResponse))
)]
pub async fn get_state(State(state): State<SharedState>) -> Json<StateResponse> {
    Json(admin_service::get_state(&state).await)
}

/// Register a player before it connects.
#[utoipa::path(
    post,
    path = "/admin/players",
    tag = "admin",
    request_body = AddPlayerRequest,
    responses(
        (status = 201, description = "Player created", body = PlayerSummary),
        (status = 409, description = "Player already exists")
    )
)]
pub async fn add_player(
    State(state): State<SharedState>,
    Json(payload): Json<AddPlayerRequest>,
) -> Result<(StatusCode, Json<PlayerSummary>), AppError> {
    payload.validate()?;
    let summary = admin_service::add_player(&state, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Remove a player and close its connection.
#[utoipa::path(
    delete,
    path = "/admin/players/{name}",
    tag = "admin",
    params(("name" = String, Path, description = "Player name")),
    responses(
        (status = 200, description = "Player removed", body = ActionResponse),
        (status = 404, description = "Unknown player")
    )
)]
pub async fn remove_player(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::remove_player(&state, &name).await?))
}

/// Force one player onto a game (sync) or instance (save) and wait for its ack.
#[utoipa::path(
    post,
    path = "/admin/players/{name}/swap",
    tag = "admin",
    params(("name" = String, Path, description = "Player name")),
    request_body = PlayerSwapRequest,
    responses(
        (status = 200, description = "Swap applied", body = PlayerSwapResponse),
        (status = 409, description = "Client rejected the swap"),
        (status = 503, description = "Client unreachable"),
        (status = 504, description = "Client did not answer in time")
    )
)]
pub async fn force_player_swap(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(payload): Json<PlayerSwapRequest>,
) -> Result<Json<PlayerSwapResponse>, AppError> {
    Ok(Json(
        admin_service::force_player_swap(&state, &name, payload).await?,
    ))
}

/// Start the session and tell assigned players to play.
#[utoipa::path(
    post,
    path = "/admin/start",
    tag = "admin",
    responses((status = 200, description = "Session started", body = ActionResponse))
)]
pub async fn start_session(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::start_session(&state).await?))
}

/// Pause the session.
#[utoipa::path(
    post,
    path = "/admin/pause",
    tag = "admin",
    responses((status = 200, description = "Session paused", body = ActionResponse))
)]
pub async fn pause_session(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::pause_session(&state).await?))
}

/// Stop and drop every instance, assignment and completion.
#[utoipa::path(
    post,
    path = "/admin/reset",
    tag = "admin",
    responses((status = 200, description = "Session reset", body = ActionResponse))
)]
pub async fn reset_session(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::reset_session(&state).await?))
}

/// Delete all save artifacts.
#[utoipa::path(
    post,
    path = "/admin/saves/clear",
    tag = "admin",
    responses((status = 200, description = "Save artifacts deleted", body = ActionResponse))
)]
pub async fn clear_saves(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::clear_saves(&state).await?))
}

/// Swap everyone now.
#[utoipa::path(
    post,
    path = "/admin/swap",
    tag = "admin",
    responses(
        (status = 200, description = "Swap performed", body = SwapResponse),
        (status = 400, description = "Catalog cannot support a swap")
    )
)]
pub async fn trigger_swap(
    State(state): State<SharedState>,
) -> Result<Json<SwapResponse>, AppError> {
    Ok(Json(admin_service::trigger_swap(&state).await?))
}

/// Enable, disable or flip scheduled swaps.
#[utoipa::path(
    post,
    path = "/admin/swap/toggle",
    tag = "admin",
    request_body = ToggleSwapRequest,
    responses((status = 200, description = "Scheduling flag", body = SwapEnabledResponse))
)]
pub async fn toggle_swap(
    State(state): State<SharedState>,
    payload: Option<Json<ToggleSwapRequest>>,
) -> Result<Json<SwapEnabledResponse>, AppError> {
    let enabled = payload.and_then(|Json(request)| request.enabled);
    Ok(Json(admin_service::toggle_swap(&state, enabled).await?))
}

/// Put every player on one game (sync mode only).
#[utoipa::path(
    post,
    path = "/admin/swap/assign-all",
    tag = "admin",
    request_body = AssignAllRequest,
    responses(
        (status = 200, description = "Every player assigned", body = SwapResponse),
        (status = 409, description = "Not in sync mode")
    )
)]
pub async fn assign_all(
    State(state): State<SharedState>,
    Json(payload): Json<AssignAllRequest>,
) -> Result<Json<SwapResponse>, AppError> {
    payload.validate()?;
    Ok(Json(admin_service::assign_all(&state, &payload.game).await?))
}

/// Active game mode.
#[utoipa::path(
    get,
    path = "/admin/mode",
    tag = "admin",
    responses((status = 200, description = "Active game mode", body = ModeResponse))
)]
pub async fn get_mode(State(state): State<SharedState>) -> Json<ModeResponse> {
    Json(admin_service::get_mode(&state).await)
}

/// Switch game mode; the catalog must suit the new mode.
#[utoipa::path(
    put,
    path = "/admin/mode",
    tag = "admin",
    request_body = SetModeRequest,
    responses(
        (status = 200, description = "Mode changed", body = ModeResponse),
        (status = 400, description = "Unknown mode or unsuitable catalog")
    )
)]
pub async fn set_mode(
    State(state): State<SharedState>,
    Json(payload): Json<SetModeRequest>,
) -> Result<Json<ModeResponse>, AppError> {
    Ok(Json(admin_service::set_mode(&state, &payload.mode).await?))
}

/// Swap interval bounds and the next swap time.
#[utoipa::path(
    get,
    path = "/admin/interval",
    tag = "admin",
    responses((status = 200, description = "Swap interval and next swap time", body = IntervalResponse))
)]
pub async fn get_interval(State(state): State<SharedState>) -> Json<IntervalResponse> {
    Json(admin_service::get_interval(&state).await)
}

/// Change the swap interval bounds.
#[utoipa::path(
    put,
    path = "/admin/interval",
    tag = "admin",
    request_body = IntervalRequest,
    responses(
        (status = 200, description = "Interval updated", body = IntervalResponse),
        (status = 400, description = "Invalid bounds")
    )
)]
pub async fn set_interval(
    State(state): State<SharedState>,
    Json(payload): Json<IntervalRequest>,
) -> Result<Json<IntervalResponse>, AppError> {
    payload.validate()?;
    Ok(Json(
        admin_service::set_interval(
            &state,
            payload.min_interval_secs,
            payload.max_interval_secs,
        )
        .await?,
    ))
}

/// Mark a game or instance completed for every player.
#[utoipa::path(
    post,
    path = "/admin/completed",
    tag = "admin",
    request_body = MarkCompletedRequest,
    responses((status = 200, description = "Completion recorded", body = ActionResponse))
)]
pub async fn mark_completed(
    State(state): State<SharedState>,
    Json(payload): Json<MarkCompletedRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::mark_completed(&state, payload).await?))
}

/// Replace rotation list, main games and instances.
#[utoipa::path(
    put,
    path = "/admin/catalog",
    tag = "admin",
    request_body = CatalogRequest,
    responses(
        (status = 200, description = "Catalog replaced", body = StateResponse),
        (status = 400, description = "Invalid catalog")
    )
)]
pub async fn update_catalog(
    State(state): State<SharedState>,
    Json(payload): Json<CatalogRequest>,
) -> Result<Json<StateResponse>, AppError> {
    payload.validate()?;
    Ok(Json(admin_service::update_catalog(&state, payload).await?))
}

/// Remove one instance, unassigning its holder.
#[utoipa::path(
    delete,
    path = "/admin/instances/{id}",
    tag = "admin",
    params(("id" = String, Path, description = "Instance identifier")),
    responses(
        (status = 200, description = "Instance removed", body = ActionResponse),
        (status = 404, description = "Unknown instance")
    )
)]
pub async fn remove_instance(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::remove_instance(&state, &id).await?))
}
