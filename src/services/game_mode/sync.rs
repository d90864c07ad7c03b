use rand::seq::IndexedRandom;

use crate::{
    dto::admin::PlayerAssignment,
    error::ServiceError,
    services::game_mode::{ModeError, PlayerSwapPlan, SwapPlan},
    state::model::{Assignment, GameMode, SessionState},
};

/// Rotation must offer an actual choice.
const MIN_ROTATION_GAMES: usize = 2;

/// Everyone plays the same game, drawn from the rotation list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMode;

impl SyncMode {
    /// Seed an empty rotation from the catalog, then require a real choice of games.
    pub fn setup_state(&self, session: &mut SessionState) -> Result<(), ModeError> {
        if session.games.is_empty() {
            session.games = session
                .main_games
                .iter()
                .map(|game| game.file.clone())
                .filter(|file| !file.is_empty())
                .collect();
        }
        if session.games.len() < MIN_ROTATION_GAMES {
            return Err(ModeError::NotEnoughGames {
                mode: GameMode::Sync,
                required: MIN_ROTATION_GAMES,
                found: session.games.len(),
            });
        }
        Ok(())
    }

    /// Join the group in progress: the player's own game, else anyone's, else a fresh draw.
    pub fn resolve_assignment(&self, session: &SessionState, player: &str) -> Assignment {
        let current = session
            .players
            .get(player)
            .filter(|p| p.is_assigned())
            .or_else(|| session.players.values().find(|p| p.is_assigned()))
            .map(|p| p.game.clone());

        match current.or_else(|| draw_game(&session.games)) {
            Some(game) => Assignment {
                game,
                instance_id: String::new(),
            },
            None => Assignment::none(),
        }
    }

    pub(super) fn plan_swap(&self, session: &mut SessionState) -> Result<SwapPlan, ModeError> {
        let game = draw_game(&session.games).ok_or(ModeError::NoGames)?;
        let assignment = Assignment {
            game: game.clone(),
            instance_id: String::new(),
        };

        let mut plan = SwapPlan::default();
        for player in session.players.values_mut() {
            player.game = game.clone();
            player.instance_id.clear();
            plan.assignments.push(PlayerAssignment {
                player: player.name.clone(),
                game: game.clone(),
                instance_id: String::new(),
            });
            if player.connected {
                plan.notify.push((player.name.clone(), assignment.clone()));
            }
        }
        Ok(plan)
    }

    pub(super) fn plan_player_swap(
        &self,
        session: &mut SessionState,
        player: &str,
        game: &str,
    ) -> Result<PlayerSwapPlan, ServiceError> {
        if game.is_empty() {
            return Err(ServiceError::InvalidInput(
                "sync mode swap requires a game".into(),
            ));
        }
        let record = session
            .players
            .get_mut(player)
            .ok_or_else(|| ServiceError::NotFound(format!("player `{player}` not found")))?;
        record.game = game.to_string();
        record.instance_id.clear();

        Ok(PlayerSwapPlan {
            assignment: Assignment {
                game: game.to_string(),
                instance_id: String::new(),
            },
            ..PlayerSwapPlan::default()
        })
    }
}

/// Uniformly random pick from the rotation.
fn draw_game(games: &[String]) -> Option<String> {
    games.choose(&mut rand::rng()).cloned()
}
