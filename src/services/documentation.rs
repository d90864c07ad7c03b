use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the swap conductor.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::admin_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::saves::upload_save,
        crate::routes::saves::download_save,
        crate::routes::admin::get_state,
        crate::routes::admin::add_player,
        crate::routes::admin::remove_player,
        crate::routes::admin::force_player_swap,
        crate::routes::admin::start_session,
        crate::routes::admin::pause_session,
        crate::routes::admin::reset_session,
        crate::routes::admin::clear_saves,
        crate::routes::admin::trigger_swap,
        crate::routes::admin::toggle_swap,
        crate::routes::admin::assign_all,
        crate::routes::admin::get_mode,
        crate::routes::admin::set_mode,
        crate::routes::admin::get_interval,
        crate::routes::admin::set_interval,
        crate::routes::admin::mark_completed,
        crate::routes::admin::update_catalog,
        crate::routes::admin::remove_instance,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::ws::Envelope,
            crate::dto::ws::CommandTag,
            crate::dto::ws::HelloPayload,
            crate::dto::ws::AssignmentPayload,
            crate::dto::ws::GamesUpdatePayload,
            crate::dto::ws::GamesUpdateAckPayload,
            crate::dto::ws::StateUpdatePayload,
            crate::dto::sse::StateUpdatedEvent,
            crate::dto::sse::PlayerConnectionEvent,
            crate::dto::sse::PlayerStatusEvent,
            crate::dto::sse::SwapCompletedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "clients", description = "WebSocket protocol for emulator clients"),
        (name = "admin", description = "Session control for operators"),
        (name = "saves", description = "Save artifact transfer"),
    )
)]
pub struct ApiDoc;
