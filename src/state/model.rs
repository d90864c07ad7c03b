//! Authoritative session data: players, catalog, instances and scheduling knobs.
//!
//! Every struct here is persisted verbatim to the state file, so the schema is
//! closed (`deny_unknown_fields`) and every collection tolerates `null` on decode.

use std::{collections::BTreeSet, fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use thiserror::Error;
use utoipa::ToSchema;

/// Active game-mode strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Everyone plays the same game, drawn from the rotation list.
    #[default]
    Sync,
    /// Every player holds a distinct save instance.
    Save,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Sync => f.write_str("sync"),
            GameMode::Save => f.write_str("save"),
        }
    }
}

/// Raised when a mode name does not match any known strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown game mode `{0}`")]
pub struct UnknownMode(pub String);

impl FromStr for GameMode {
    type Err = UnknownMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(GameMode::Sync),
            "save" => Ok(GameMode::Save),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Lifecycle of an instance's save artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// No artifact exists yet.
    #[default]
    None,
    /// A hand-off is in progress; the artifact is being moved.
    Pending,
    /// The artifact is available for the current holder.
    Ready,
}

/// A connected (or previously connected) emulator client.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Player {
    /// Unique player name, also the map key.
    pub name: String,
    /// Whether a live session is bound.
    #[serde(default)]
    pub connected: bool,
    /// Currently assigned game file, empty when unassigned.
    #[serde(default)]
    pub game: String,
    /// Held save instance, empty in sync mode or when unassigned.
    #[serde(default)]
    pub instance_id: String,
    /// Client reported having the catalog assets.
    #[serde(default)]
    pub has_files: bool,
    /// Last measured round trip.
    #[serde(default)]
    pub ping_ms: u64,
    /// Games this player no longer receives.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub completed_games: BTreeSet<String>,
    /// Instances this player no longer receives.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub completed_instances: BTreeSet<String>,
}

impl Player {
    /// Fresh, unassigned player record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Drop the current game and instance.
    pub fn clear_assignment(&mut self) {
        self.game.clear();
        self.instance_id.clear();
    }

    /// Whether the player currently has something to play.
    pub fn is_assigned(&self) -> bool {
        !self.game.is_empty()
    }
}

/// Catalog entry: a game file plus the companion files it needs.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MainGame {
    /// Game file name as served to clients.
    pub file: String,
    /// Companion files the game needs.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub extra_files: Vec<String>,
}

/// Version metadata of the most recent save artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SaveVersion {
    /// Content hash of the artifact.
    #[serde(default)]
    pub hash: String,
    /// Artifact size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Unix milliseconds of the last upload.
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub piece_len: u64,
}

/// Save-mode unit pairing a game with its save-continuity artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct GameSwapInstance {
    /// Stable instance id, also the artifact name.
    pub id: String,
    /// Game this instance runs.
    pub game: String,
    /// Where the save artifact stands.
    #[serde(default)]
    pub file_state: FileState,
    #[serde(default)]
    pub save: SaveVersion,
    /// Player currently moving the save, if any.
    #[serde(default)]
    pub pending_player: String,
}

impl GameSwapInstance {
    /// New instance with no save artifact yet.
    pub fn new(id: impl Into<String>, game: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            game: game.into(),
            ..Self::default()
        }
    }
}

/// What a player should be playing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// Game file, empty when unassigned.
    pub game: String,
    /// Instance id in save mode, empty otherwise.
    pub instance_id: String,
}

impl Assignment {
    /// Nothing to play.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a game was assigned.
    pub fn is_some(&self) -> bool {
        !self.game.is_empty()
    }
}

/// Process-wide session state; exclusively owned by the state store.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionState {
    /// Session started and not paused.
    #[serde(default)]
    pub running: bool,
    /// Scheduled swaps allowed.
    #[serde(default)]
    pub swap_enabled: bool,
    /// Active strategy.
    #[serde(default)]
    pub mode: GameMode,
    /// Lower bound of the swap delay.
    #[serde(default)]
    pub min_interval_secs: u64,
    /// Upper bound of the swap delay.
    #[serde(default)]
    pub max_interval_secs: u64,
    /// Unix milliseconds of the next scheduled swap, 0 when none is scheduled.
    #[serde(default)]
    pub next_swap_at: i64,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub games: Vec<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub main_games: Vec<MainGame>,
    /// Save-mode instances.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub instances: Vec<GameSwapInstance>,
    /// Players by name, in registration order.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub players: IndexMap<String, Player>,
    /// Unix milliseconds of the last mutation.
    #[serde(default)]
    pub updated_at: i64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            running: false,
            swap_enabled: false,
            mode: GameMode::Sync,
            min_interval_secs: 0,
            max_interval_secs: 0,
            next_swap_at: 0,
            games: Vec::new(),
            main_games: Vec::new(),
            instances: Vec::new(),
            players: IndexMap::new(),
            updated_at: 0,
        }
    }
}

impl SessionState {
    /// Instance by id.
    pub fn instance(&self, id: &str) -> Option<&GameSwapInstance> {
        self.instances.iter().find(|instance| instance.id == id)
    }

    /// Mutable instance by id.
    pub fn instance_mut(&mut self, id: &str) -> Option<&mut GameSwapInstance> {
        self.instances.iter_mut().find(|instance| instance.id == id)
    }

    /// Name of the player holding `instance_id`, if any.
    pub fn holder_of(&self, instance_id: &str) -> Option<&str> {
        if instance_id.is_empty() {
            return None;
        }
        self.players
            .values()
            .find(|player| player.instance_id == instance_id)
            .map(|player| player.name.as_str())
    }

    /// Player record for `name`, created unassigned when missing.
    pub fn player_entry(&mut self, name: &str) -> &mut Player {
        self.players
            .entry(name.to_string())
            .or_insert_with(|| Player::new(name))
    }

    /// Names of players with a live session.
    pub fn connected_players(&self) -> Vec<String> {
        self.players
            .values()
            .filter(|player| player.connected)
            .map(|player| player.name.clone())
            .collect()
    }

    /// Remove an instance and unassign whoever holds it.
    pub fn remove_instance(&mut self, id: &str) -> Option<GameSwapInstance> {
        let position = self.instances.iter().position(|instance| instance.id == id)?;
        let removed = self.instances.remove(position);
        for player in self.players.values_mut() {
            if player.instance_id == id {
                player.clear_assignment();
            }
        }
        Some(removed)
    }

    /// Replace the instance list; holders of instances that disappear are unassigned.
    pub fn replace_instances(&mut self, instances: Vec<GameSwapInstance>) {
        for player in self.players.values_mut() {
            if !player.instance_id.is_empty()
                && !instances.iter().any(|instance| instance.id == player.instance_id)
            {
                player.clear_assignment();
            }
        }
        self.instances = instances;
    }

    /// Clear every player's game and instance.
    pub fn clear_assignments(&mut self) {
        for player in self.players.values_mut() {
            player.clear_assignment();
        }
    }

    /// Fix up a freshly decoded state: nobody is connected after a restart, and file
    /// readiness is whatever the disk says.
    pub fn reconcile_after_load(&mut self, artifact_exists: impl Fn(&str) -> bool) {
        for player in self.players.values_mut() {
            player.connected = false;
        }
        for instance in &mut self.instances {
            instance.file_state = if artifact_exists(&instance.id) {
                FileState::Ready
            } else {
                FileState::None
            };
            instance.pending_player.clear();
        }
    }
}
