//! Business logic powering the admin REST routes. Every operation funnels its
//! state change through the store, then tells connected clients and wakes the
//! scheduler when timing may have changed.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::{
    dto::{
        admin::{
            ActionResponse, CatalogRequest, IntervalResponse, MarkCompletedRequest, ModeResponse,
            PlayerAssignment, PlayerSummary, PlayerSwapRequest, PlayerSwapResponse, StateResponse,
            SwapEnabledResponse, SwapResponse,
        },
        format_unix_millis,
        ws::{CommandTag, Envelope},
    },
    error::ServiceError,
    services::{
        game_mode::{GameModeHandler, dispatch_swap},
        messaging::{
            assignment_envelope, broadcast, broadcast_state_update, games_update_envelope,
            send_to_player,
        },
    },
    state::{
        SharedState,
        model::{Assignment, FileState, GameMode, GameSwapInstance, Player, SaveVersion},
    },
};

// ---------------------------------------------------------------------------
// Read-only projections
// ---------------------------------------------------------------------------

/// Full session snapshot.
pub async fn get_state(state: &SharedState) -> StateResponse {
    state.store().read(|s| StateResponse::from(s)).await
}

/// Active game mode.
pub async fn get_mode(state: &SharedState) -> ModeResponse {
    ModeResponse {
        mode: state.store().read(|s| s.mode).await,
    }
}

/// Interval bounds plus the next swap as RFC 3339.
pub async fn get_interval(state: &SharedState) -> IntervalResponse {
    state
        .store()
        .read(|s| IntervalResponse {
            min_interval_secs: s.min_interval_secs,
            max_interval_secs: s.max_interval_secs,
            next_swap_at: s.next_swap_at,
            next_swap_at_rfc3339: (s.next_swap_at > 0)
                .then(|| format_unix_millis(s.next_swap_at))
                .flatten(),
        })
        .await
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Register a player ahead of its first handshake.
pub async fn add_player(state: &SharedState, name: &str) -> Result<PlayerSummary, ServiceError> {
    let summary = state
        .store()
        .try_update(|s| {
            if s.players.contains_key(name) {
                return Err(ServiceError::InvalidState(format!(
                    "player `{name}` already exists"
                )));
            }
            let player = Player::new(name);
            let summary = PlayerSummary::from(&player);
            s.players.insert(name.to_string(), player);
            Ok(summary)
        })
        .await?;
    info!(player = %name, "player added");
    Ok(summary)
}

/// Delete a player record and hang up its live session, if any.
pub async fn remove_player(state: &SharedState, name: &str) -> Result<ActionResponse, ServiceError> {
    state
        .store()
        .try_update(|s| {
            s.players
                .shift_remove(name)
                .map(|_| ())
                .ok_or_else(|| ServiceError::NotFound(format!("player `{name}` not found")))
        })
        .await?;
    if state.drop_session(name) {
        info!(player = %name, "live session closed for removed player");
    }
    info!(player = %name, "player removed");
    Ok(ActionResponse::new(format!("player `{name}` removed")))
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Mark the session running and tell every connected player what to play.
pub async fn start_session(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let targets: Vec<(String, Assignment)> = state
        .store()
        .update(|s| {
            s.running = true;
            s.players
                .values()
                .filter(|p| p.connected && p.is_assigned())
                .map(|p| {
                    (
                        p.name.clone(),
                        Assignment {
                            game: p.game.clone(),
                            instance_id: p.instance_id.clone(),
                        },
                    )
                })
                .collect()
        })
        .await;

    let started = targets
        .iter()
        .filter(|(name, assignment)| {
            let sent = assignment_envelope(CommandTag::Start, assignment)
                .and_then(|envelope| send_to_player(state, name, &envelope));
            match sent {
                Ok(()) => true,
                Err(err) => {
                    warn!(player = %name, error = %err, "start delivery failed");
                    false
                }
            }
        })
        .count();

    broadcast_state_update(state).await;
    state.wake_scheduler();
    info!(players = started, "session started");
    Ok(ActionResponse::new("started"))
}

/// Stop scheduled swaps and tell every client to pause.
pub async fn pause_session(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    state.store().update(|s| s.running = false).await;
    broadcast(state, |_| Ok(Envelope::bare(CommandTag::Pause)));
    broadcast_state_update(state).await;
    state.wake_scheduler();
    info!("session paused");
    Ok(ActionResponse::new("paused"))
}

/// Stop the session and drop every instance, assignment and completion.
///
/// The rotation list and main games survive; save artifacts on disk are left
/// for `clear_saves`.
pub async fn reset_session(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let dropped = state
        .store()
        .update(|s| {
            s.running = false;
            s.next_swap_at = 0;
            for player in s.players.values_mut() {
                player.clear_assignment();
                player.completed_games.clear();
                player.completed_instances.clear();
            }
            std::mem::take(&mut s.instances).len()
        })
        .await;
    broadcast(state, |_| Ok(Envelope::bare(CommandTag::Reset)));
    broadcast_state_update(state).await;
    state.wake_scheduler();
    info!(instances = dropped, "session reset");
    Ok(ActionResponse::new("reset"))
}

/// Delete every stored save artifact and mark all instances `None`.
pub async fn clear_saves(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let removed = state.saves().clear_all().await?;
    state
        .store()
        .update(|s| {
            for instance in &mut s.instances {
                instance.file_state = FileState::None;
                instance.pending_player.clear();
                instance.save = SaveVersion::default();
            }
        })
        .await;
    broadcast(state, |_| Ok(Envelope::bare(CommandTag::ClearSaves)));
    info!(removed, "save artifacts cleared");
    Ok(ActionResponse::new(format!("{removed} save files removed")))
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Set scheduling on or off, or flip it when `enabled` is `None`.
pub async fn toggle_swap(
    state: &SharedState,
    enabled: Option<bool>,
) -> Result<SwapEnabledResponse, ServiceError> {
    let swap_enabled = state
        .store()
        .update(|s| {
            s.swap_enabled = enabled.unwrap_or(!s.swap_enabled);
            s.swap_enabled
        })
        .await;
    state.wake_scheduler();
    broadcast_state_update(state).await;
    info!(swap_enabled, "swap scheduling toggled");
    Ok(SwapEnabledResponse { swap_enabled })
}

/// Replace the interval bounds and re-arm the scheduler.
pub async fn set_interval(
    state: &SharedState,
    min_interval_secs: u64,
    max_interval_secs: u64,
) -> Result<IntervalResponse, ServiceError> {
    if min_interval_secs == 0 || min_interval_secs > max_interval_secs {
        return Err(ServiceError::InvalidInput(format!(
            "invalid interval bounds {min_interval_secs}..={max_interval_secs}"
        )));
    }
    state
        .store()
        .update(|s| {
            s.min_interval_secs = min_interval_secs;
            s.max_interval_secs = max_interval_secs;
        })
        .await;
    state.wake_scheduler();
    broadcast_state_update(state).await;
    Ok(get_interval(state).await)
}

// ---------------------------------------------------------------------------
// Modes and swaps
// ---------------------------------------------------------------------------

/// Switch to `mode`, validating the catalog for it first.
///
/// Changing mode clears every assignment; setting the current mode again only
/// re-runs the validation.
pub async fn set_mode(state: &SharedState, mode: &str) -> Result<ModeResponse, ServiceError> {
    let mode: GameMode = mode.parse()?;
    let handler = GameModeHandler::for_mode(mode);
    let changed = state
        .store()
        .try_update(|s| {
            handler.setup_state(s)?;
            let changed = s.mode != mode;
            if changed {
                s.clear_assignments();
                s.mode = mode;
            }
            Ok::<_, ServiceError>(changed)
        })
        .await?;

    if changed {
        info!(mode = %mode, "game mode changed");
        // Clients keep playing their old assignment until told otherwise.
        for name in state.store().read(|s| s.connected_players()).await {
            dispatch_swap(state, name, Assignment::none());
        }
    }
    broadcast_state_update(state).await;
    state.wake_scheduler();
    Ok(ModeResponse { mode })
}

/// Run a full swap now and restart the countdown.
pub async fn trigger_swap(state: &SharedState) -> Result<SwapResponse, ServiceError> {
    let handler = GameModeHandler::active(state).await;
    let assignments = handler.handle_swap(state).await?;
    state.wake_scheduler();
    Ok(SwapResponse {
        mode: handler.mode(),
        assignments,
    })
}

/// Override one player and wait for its answer.
pub async fn force_player_swap(
    state: &SharedState,
    player: &str,
    request: PlayerSwapRequest,
) -> Result<PlayerSwapResponse, ServiceError> {
    let handler = GameModeHandler::active(state).await;
    handler
        .handle_player_swap(state, player, &request.game, &request.instance_id)
        .await
}

/// Put every player on `game` (sync mode only).
pub async fn assign_all(state: &SharedState, game: &str) -> Result<SwapResponse, ServiceError> {
    let (assignments, notify) = state
        .store()
        .try_update(|s| {
            if s.mode != GameMode::Sync {
                return Err(ServiceError::InvalidState(format!(
                    "assigning one game to everyone requires sync mode, current mode is {}",
                    s.mode
                )));
            }
            let mut assignments = Vec::with_capacity(s.players.len());
            let mut notify = Vec::new();
            for player in s.players.values_mut() {
                player.game = game.to_string();
                player.instance_id.clear();
                assignments.push(PlayerAssignment {
                    player: player.name.clone(),
                    game: game.to_string(),
                    instance_id: String::new(),
                });
                if player.connected {
                    notify.push(player.name.clone());
                }
            }
            Ok((assignments, notify))
        })
        .await?;

    let assignment = Assignment {
        game: game.to_string(),
        instance_id: String::new(),
    };
    for name in notify {
        dispatch_swap(state, name, assignment.clone());
    }
    info!(game = %game, players = assignments.len(), "all players assigned");
    Ok(SwapResponse {
        mode: GameMode::Sync,
        assignments,
    })
}

/// Record a game and/or an instance as completed for every player.
pub async fn mark_completed(
    state: &SharedState,
    request: MarkCompletedRequest,
) -> Result<ActionResponse, ServiceError> {
    let game = request.game.filter(|g| !g.is_empty());
    let instance_id = request.instance_id.filter(|i| !i.is_empty());
    if game.is_none() && instance_id.is_none() {
        return Err(ServiceError::InvalidInput(
            "a game or an instance id is required".into(),
        ));
    }

    state
        .store()
        .try_update(|s| {
            if let Some(id) = &instance_id {
                if s.instance(id).is_none() {
                    return Err(ServiceError::NotFound(format!("instance `{id}` not found")));
                }
            }
            for player in s.players.values_mut() {
                if let Some(game) = &game {
                    player.completed_games.insert(game.clone());
                }
                if let Some(id) = &instance_id {
                    player.completed_instances.insert(id.clone());
                }
            }
            Ok(())
        })
        .await?;
    broadcast_state_update(state).await;
    Ok(ActionResponse::new("marked completed"))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Replace rotation list, main games and instances in one mutation.
///
/// Instances kept by id retain their file state and save metadata; new ones
/// take theirs from disk. While the session runs, the new catalog must satisfy
/// the active mode.
pub async fn update_catalog(
    state: &SharedState,
    request: CatalogRequest,
) -> Result<StateResponse, ServiceError> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = request.instances.iter().find(|i| !seen.insert(i.id.as_str())) {
        return Err(ServiceError::InvalidInput(format!(
            "duplicate instance id `{}`",
            duplicate.id
        )));
    }

    // Disk checks stay outside the store lock.
    let on_disk: HashMap<String, bool> = request
        .instances
        .iter()
        .map(|input| (input.id.clone(), state.saves().exists(&input.id)))
        .collect();

    let CatalogRequest {
        games,
        main_games,
        instances,
    } = request;

    let (unassigned, moved) = state
        .store()
        .try_update(|s| {
            let held_before: Vec<String> = s
                .players
                .values()
                .filter(|p| p.connected && !p.instance_id.is_empty())
                .map(|p| p.name.clone())
                .collect();

            let mut regamed = Vec::new();
            let next: Vec<GameSwapInstance> = instances
                .iter()
                .map(|input| match s.instance(&input.id) {
                    Some(existing) => {
                        if existing.game != input.game {
                            regamed.push(input.id.clone());
                        }
                        GameSwapInstance {
                            game: input.game.clone(),
                            ..existing.clone()
                        }
                    }
                    None => {
                        let mut fresh = GameSwapInstance::new(input.id.clone(), input.game.clone());
                        if on_disk.get(&input.id).copied().unwrap_or(false) {
                            fresh.file_state = FileState::Ready;
                        }
                        fresh
                    }
                })
                .collect();

            s.games = games;
            s.main_games = main_games;
            s.replace_instances(next);

            if s.running {
                GameModeHandler::for_mode(s.mode).setup_state(s)?;
            }

            // Holders follow their instance onto its new game.
            let mut moved = Vec::new();
            for instance_id in regamed {
                let Some(game) = s.instance(&instance_id).map(|i| i.game.clone()) else {
                    continue;
                };
                let Some(holder) = s.holder_of(&instance_id).map(str::to_string) else {
                    continue;
                };
                if let Some(player) = s.players.get_mut(&holder) {
                    player.game = game.clone();
                    if player.connected {
                        moved.push((holder, Assignment { game, instance_id }));
                    }
                }
            }

            let unassigned: Vec<String> = held_before
                .into_iter()
                .filter(|name| s.players.get(name).is_some_and(|p| !p.is_assigned()))
                .collect();
            Ok::<_, ServiceError>((unassigned, moved))
        })
        .await?;

    for name in unassigned {
        dispatch_swap(state, name, Assignment::none());
    }
    for (name, assignment) in moved {
        dispatch_swap(state, name, assignment);
    }
    let snapshot = state.store().snapshot().await;
    broadcast(state, |_| games_update_envelope(&snapshot));
    info!(
        games = snapshot.games.len(),
        instances = snapshot.instances.len(),
        "catalog replaced"
    );
    Ok(StateResponse::from(&snapshot))
}

/// Drop one instance; its holder is unassigned in the same mutation and told to stop.
pub async fn remove_instance(
    state: &SharedState,
    instance_id: &str,
) -> Result<ActionResponse, ServiceError> {
    let holder = state
        .store()
        .try_update(|s| {
            let holder = s
                .holder_of(instance_id)
                .filter(|name| s.players.get(*name).is_some_and(|p| p.connected))
                .map(str::to_string);
            s.remove_instance(instance_id)
                .ok_or_else(|| ServiceError::NotFound(format!("instance `{instance_id}` not found")))?;
            Ok::<_, ServiceError>(holder)
        })
        .await?;

    if let Some(name) = holder {
        dispatch_swap(state, name, Assignment::none());
    }
    info!(instance = %instance_id, "instance removed");
    Ok(ActionResponse::new(format!("instance `{instance_id}` removed")))
}
