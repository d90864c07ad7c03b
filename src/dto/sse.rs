use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{dto::admin::PlayerAssignment, state::model::GameMode};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name.
    pub event: Option<String>,
    /// Serialized JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Emitted after every state store mutation.
pub struct StateUpdatedEvent {
    pub updated_at: i64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Emitted when a player session binds or drops.
pub struct PlayerConnectionEvent {
    pub name: String,
    pub connected: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Relays a client `status` report to admin listeners.
pub struct PlayerStatusEvent {
    pub name: String,
    #[schema(value_type = Object)]
    pub status: Value,
}

#[derive(Debug, Serialize, ToSchema)]
/// Emitted once a swap has been computed and dispatched.
pub struct SwapCompletedEvent {
    pub mode: GameMode,
    pub assignments: Vec<PlayerAssignment>,
}
