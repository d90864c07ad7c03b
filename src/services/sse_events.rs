use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    dto::sse::{
        PlayerConnectionEvent, PlayerStatusEvent, ServerEvent, StateUpdatedEvent,
        SwapCompletedEvent,
    },
    state::AppState,
};

/// Event name for store change stamps.
pub const EVENT_STATE_UPDATED: &str = "state.updated";
const EVENT_PLAYER_CONNECTED: &str = "player.connected";
const EVENT_PLAYER_DISCONNECTED: &str = "player.disconnected";
const EVENT_PLAYER_STATUS: &str = "player.status";
const EVENT_SWAP_COMPLETED: &str = "swap.completed";

/// Build the event announcing a new `updated_at` stamp.
pub fn state_updated_event(updated_at: i64) -> Option<ServerEvent> {
    ServerEvent::json(
        Some(EVENT_STATE_UPDATED.to_string()),
        &StateUpdatedEvent { updated_at },
    )
    .map_err(|err| warn!(error = %err, "failed to serialize state update event"))
    .ok()
}

/// Broadcast that a player session bound or dropped.
pub fn broadcast_player_connection(state: &AppState, name: &str, connected: bool) {
    let event = if connected {
        EVENT_PLAYER_CONNECTED
    } else {
        EVENT_PLAYER_DISCONNECTED
    };
    send_admin_event(
        state,
        event,
        &PlayerConnectionEvent {
            name: name.to_string(),
            connected,
        },
    );
}

/// Relay a client status report.
pub fn broadcast_player_status(state: &AppState, name: &str, status: Value) {
    send_admin_event(
        state,
        EVENT_PLAYER_STATUS,
        &PlayerStatusEvent {
            name: name.to_string(),
            status,
        },
    );
}

/// Broadcast the outcome of a full swap.
pub fn broadcast_swap_completed(state: &AppState, payload: &SwapCompletedEvent) {
    send_admin_event(state, EVENT_SWAP_COMPLETED, payload);
}

fn send_admin_event<T: Serialize>(state: &AppState, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => {
            let receivers = state.events().broadcast(message);
            debug!(event, receivers, "admin event published");
        }
        Err(err) => warn!(event, error = %err, "failed to serialize admin event"),
    }
}
