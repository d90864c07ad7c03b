//! Game-mode strategies deciding who plays what.
//!
//! The set of modes is closed: [`GameModeHandler`] has one variant per
//! [`GameMode`], and an unknown mode name is rejected when it is parsed, long
//! before a swap runs. Each strategy computes its assignments inside a single
//! store mutation; delivery to clients happens afterwards.

mod save;
mod sync;

use thiserror::Error;
use tracing::info;

use crate::{
    dto::{
        admin::{PlayerAssignment, PlayerSwapResponse},
        sse::SwapCompletedEvent,
        ws::CommandTag,
    },
    error::ServiceError,
    services::{
        background::spawn_detached,
        file_state::{mark_pending, refresh_from_disk},
        messaging::{SendError, assignment_envelope},
        replies::{Reply, send_and_wait},
        sse_events,
    },
    state::{
        SharedState,
        model::{Assignment, GameMode, SessionState},
    },
};

pub use self::{save::SaveMode, sync::SyncMode};

/// Configuration errors: the requested mode cannot operate on the current catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("unknown game mode `{0}`")]
    Unknown(String),
    #[error("{mode} mode needs at least {required} games in rotation, found {found}")]
    NotEnoughGames {
        mode: GameMode,
        required: usize,
        found: usize,
    },
    #[error("no games configured")]
    NoGames,
    #[error("no instances configured")]
    NoInstances,
    #[error("instance `{0}` has no game")]
    InstanceWithoutGame(String),
}

/// Result of a mode's swap computation, applied inside one store mutation.
#[derive(Debug, Default)]
pub struct SwapPlan {
    /// Assignment of every player after the swap.
    pub assignments: Vec<PlayerAssignment>,
    /// Connected players and the swap command each should receive.
    pub notify: Vec<(String, Assignment)>,
    /// Instances whose save must move, paired with the player moving it.
    pub handoffs: Vec<(String, String)>,
}

/// Result of an administrative single-player override.
#[derive(Debug, Default)]
pub struct PlayerSwapPlan {
    /// The overridden player's new assignment.
    pub assignment: Assignment,
    /// Connected player knocked off the instance, to be told to stop.
    pub displaced: Option<String>,
    pub handoffs: Vec<(String, String)>,
}

/// Strategy for the active [`GameMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameModeHandler {
    Sync(SyncMode),
    Save(SaveMode),
}

impl GameModeHandler {
    /// Handler for `mode`.
    pub fn for_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::Sync => GameModeHandler::Sync(SyncMode),
            GameMode::Save => GameModeHandler::Save(SaveMode),
        }
    }

    /// Handler for the mode currently stored in the session.
    pub async fn active(state: &SharedState) -> Self {
        let mode = state.store().read(|session| session.mode).await;
        Self::for_mode(mode)
    }

    /// Mode this handler implements.
    pub fn mode(&self) -> GameMode {
        match self {
            GameModeHandler::Sync(_) => GameMode::Sync,
            GameModeHandler::Save(_) => GameMode::Save,
        }
    }

    /// Check (and where possible prepare) the catalog before this mode is activated.
    pub fn setup_state(&self, session: &mut SessionState) -> Result<(), ModeError> {
        match self {
            GameModeHandler::Sync(mode) => mode.setup_state(session),
            GameModeHandler::Save(mode) => mode.setup_state(session),
        }
    }

    /// What `player` should be playing right now, used on (re)connect.
    pub fn resolve_assignment(&self, session: &SessionState, player: &str) -> Assignment {
        match self {
            GameModeHandler::Sync(mode) => mode.resolve_assignment(session, player),
            GameModeHandler::Save(mode) => mode.resolve_assignment(session, player),
        }
    }

    fn plan_swap(&self, session: &mut SessionState) -> Result<SwapPlan, ModeError> {
        match self {
            GameModeHandler::Sync(mode) => mode.plan_swap(session),
            GameModeHandler::Save(mode) => mode.plan_swap(session),
        }
    }

    fn plan_player_swap(
        &self,
        session: &mut SessionState,
        player: &str,
        game: &str,
        instance_id: &str,
    ) -> Result<PlayerSwapPlan, ServiceError> {
        match self {
            GameModeHandler::Sync(mode) => mode.plan_player_swap(session, player, game),
            GameModeHandler::Save(mode) => mode.plan_player_swap(session, player, instance_id),
        }
    }

    /// Swap every eligible player and push the new assignments to connected clients.
    ///
    /// Delivery is fire-and-forget; failures are logged and do not undo the swap.
    pub async fn handle_swap(
        &self,
        state: &SharedState,
    ) -> Result<Vec<PlayerAssignment>, ServiceError> {
        let handler = *self;
        let plan = state
            .store()
            .try_update(|session| {
                if session.mode != handler.mode() {
                    return Err(ServiceError::InvalidState(format!(
                        "{} handler invoked while mode is {}",
                        handler.mode(),
                        session.mode
                    )));
                }
                Ok(handler.plan_swap(session)?)
            })
            .await?;

        // Separate mutation so the reassignment itself stays free of hand-off bookkeeping.
        mark_pending(state, &plan.handoffs).await;

        for (player, assignment) in plan.notify {
            dispatch_swap(state, player, assignment);
        }

        info!(mode = %self.mode(), players = plan.assignments.len(), "swap performed");
        sse_events::broadcast_swap_completed(
            state,
            &SwapCompletedEvent {
                mode: self.mode(),
                assignments: plan.assignments.clone(),
            },
        );
        Ok(plan.assignments)
    }

    /// Force one player onto a game (sync) or instance (save).
    ///
    /// The override is applied first; the player's acknowledgement is awaited
    /// only when it is connected.
    pub async fn handle_player_swap(
        &self,
        state: &SharedState,
        player: &str,
        game: &str,
        instance_id: &str,
    ) -> Result<PlayerSwapResponse, ServiceError> {
        let handler = *self;
        let plan = state
            .store()
            .try_update(|session| handler.plan_player_swap(session, player, game, instance_id))
            .await?;

        mark_pending(state, &plan.handoffs).await;
        if let Some(displaced) = plan.displaced {
            info!(player = %displaced, instance = %instance_id, "player displaced by override");
            dispatch_swap(state, displaced, Assignment::none());
        }
        if !plan.assignment.instance_id.is_empty() {
            refresh_from_disk(state, &plan.assignment.instance_id).await;
        }

        let acknowledged = deliver_swap(state, player, &plan.assignment).await?;
        Ok(PlayerSwapResponse {
            player: player.to_string(),
            game: plan.assignment.game,
            instance_id: plan.assignment.instance_id,
            acknowledged,
        })
    }
}

/// Send a swap and wait for the client's answer.
///
/// `Ok(false)` when the player has no live session; nothing was sent.
pub async fn deliver_swap(
    state: &SharedState,
    player: &str,
    assignment: &Assignment,
) -> Result<bool, ServiceError> {
    if !state.sessions().contains_key(player) {
        return Ok(false);
    }
    let envelope = assignment_envelope(CommandTag::Swap, assignment)?;
    match send_and_wait(state, player, &envelope, state.config().ack_timeout()).await? {
        Reply::Ack => Ok(true),
        Reply::Nack(reason) => Err(ServiceError::Rejected(reason)),
    }
}

/// Fire-and-forget swap delivery.
pub fn dispatch_swap(state: &SharedState, player: String, assignment: Assignment) {
    let state = state.clone();
    spawn_detached("swap delivery", async move {
        match deliver_swap(&state, &player, &assignment).await {
            Ok(_) => Ok(()),
            Err(ServiceError::Delivery(SendError::NotConnected(_))) => Ok(()),
            Err(err) => Err(format!("player `{player}`: {err}")),
        }
    });
}
