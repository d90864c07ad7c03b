//! DTO definitions used by the admin REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    dto::validation::{validate_instance_id, validate_player_name},
    state::model::{FileState, GameMode, GameSwapInstance, MainGame, Player, SaveVersion, SessionState},
};

/// Generic acknowledgement for control actions.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    /// Wrap a human-readable outcome.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Register a player ahead of its first handshake.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddPlayerRequest {
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
}

/// Switch the active game mode.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetModeRequest {
    pub mode: String,
}

/// Current game mode.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModeResponse {
    pub mode: GameMode,
}

/// New bounds for the randomized swap delay.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_interval_bounds"))]
pub struct IntervalRequest {
    #[validate(range(min = 1))]
    pub min_interval_secs: u64,
    #[validate(range(min = 1))]
    pub max_interval_secs: u64,
}

fn validate_interval_bounds(request: &IntervalRequest) -> Result<(), ValidationError> {
    if request.min_interval_secs > request.max_interval_secs {
        let mut err = ValidationError::new("interval_inverted");
        err.message = Some("min_interval_secs must not exceed max_interval_secs".into());
        return Err(err);
    }
    Ok(())
}

/// Scheduling parameters and the published next swap time.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntervalResponse {
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Unix milliseconds, 0 when nothing is scheduled.
    pub next_swap_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_swap_at_rfc3339: Option<String>,
}

/// Enable, disable or (when `enabled` is absent) flip swap scheduling.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ToggleSwapRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Swap scheduling flag after a toggle.
#[derive(Debug, Serialize, ToSchema)]
pub struct SwapEnabledResponse {
    pub swap_enabled: bool,
}

/// Force one player onto a game (sync) or instance (save).
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PlayerSwapRequest {
    #[serde(default)]
    pub game: String,
    #[serde(default)]
    pub instance_id: String,
}

/// Result of an administrative player swap.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerSwapResponse {
    pub player: String,
    pub game: String,
    pub instance_id: String,
    /// Whether the client acknowledged the swap; `false` when it was not connected.
    pub acknowledged: bool,
}

/// Assign every player to the same game.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignAllRequest {
    #[validate(length(min = 1))]
    pub game: String,
}

/// Mark a game and/or an instance completed for every player.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarkCompletedRequest {
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// Instance definition inside a catalog update.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct InstanceInput {
    #[validate(custom(function = "validate_instance_id"))]
    pub id: String,
    #[validate(length(min = 1))]
    pub game: String,
}

/// Full catalog replacement.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CatalogRequest {
    #[serde(default)]
    pub games: Vec<String>,
    #[serde(default)]
    pub main_games: Vec<MainGame>,
    #[serde(default)]
    #[validate(nested)]
    pub instances: Vec<InstanceInput>,
}

/// Who plays what after a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PlayerAssignment {
    pub player: String,
    pub game: String,
    pub instance_id: String,
}

/// Outcome of a full swap.
#[derive(Debug, Serialize, ToSchema)]
pub struct SwapResponse {
    pub mode: GameMode,
    pub assignments: Vec<PlayerAssignment>,
}

/// Admin projection of a player record.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerSummary {
    pub name: String,
    pub connected: bool,
    pub game: String,
    pub instance_id: String,
    pub has_files: bool,
    pub ping_ms: u64,
    pub completed_games: Vec<String>,
    pub completed_instances: Vec<String>,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            connected: player.connected,
            game: player.game.clone(),
            instance_id: player.instance_id.clone(),
            has_files: player.has_files,
            ping_ms: player.ping_ms,
            completed_games: player.completed_games.iter().cloned().collect(),
            completed_instances: player.completed_instances.iter().cloned().collect(),
        }
    }
}

/// Admin projection of an instance.
#[derive(Debug, Serialize, ToSchema)]
pub struct InstanceSummary {
    pub id: String,
    pub game: String,
    pub file_state: FileState,
    pub save: SaveVersion,
    pub pending_player: String,
    /// Player currently holding the instance.
    pub holder: Option<String>,
}

/// Full session snapshot for the admin UI.
#[derive(Debug, Serialize, ToSchema)]
pub struct StateResponse {
    pub running: bool,
    pub swap_enabled: bool,
    pub mode: GameMode,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    pub next_swap_at: i64,
    pub games: Vec<String>,
    pub main_games: Vec<MainGame>,
    pub instances: Vec<InstanceSummary>,
    pub players: Vec<PlayerSummary>,
    pub updated_at: i64,
}

impl From<&SessionState> for StateResponse {
    fn from(state: &SessionState) -> Self {
        let instances = state
            .instances
            .iter()
            .map(|instance: &GameSwapInstance| InstanceSummary {
                id: instance.id.clone(),
                game: instance.game.clone(),
                file_state: instance.file_state,
                save: instance.save.clone(),
                pending_player: instance.pending_player.clone(),
                holder: state.holder_of(&instance.id).map(str::to_string),
            })
            .collect();

        Self {
            running: state.running,
            swap_enabled: state.swap_enabled,
            mode: state.mode,
            min_interval_secs: state.min_interval_secs,
            max_interval_secs: state.max_interval_secs,
            next_swap_at: state.next_swap_at,
            games: state.games.clone(),
            main_games: state.main_games.clone(),
            instances,
            players: state.players.values().map(PlayerSummary::from).collect(),
            updated_at: state.updated_at,
        }
    }
}
