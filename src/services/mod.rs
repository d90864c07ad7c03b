/// Admin service for session control operations.
pub mod admin_service;
/// Detached background task helper.
pub mod background;
/// OpenAPI documentation generation.
pub mod documentation;
/// Save artifact readiness tracking.
pub mod file_state;
/// Game-mode strategies (sync, save).
pub mod game_mode;
/// Health check service.
pub mod health_service;
/// Outbound command delivery to client sessions.
pub mod messaging;
/// Debounced state persistence task.
pub mod persistence;
/// Correlation of commands with client acknowledgements.
pub mod replies;
/// Save artifact upload and download.
pub mod save_service;
/// Timer-driven swap scheduling.
pub mod scheduler;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
