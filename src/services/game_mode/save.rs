use rand::{rng, seq::SliceRandom};

use crate::{
    dto::admin::PlayerAssignment,
    error::ServiceError,
    services::game_mode::{ModeError, PlayerSwapPlan, SwapPlan},
    state::model::{Assignment, FileState, SessionState},
};

/// Every player holds a distinct save instance; saves travel between players.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveMode;

impl SaveMode {
    /// Save mode needs at least one instance.
    pub fn setup_state(&self, session: &mut SessionState) -> Result<(), ModeError> {
        if session.instances.is_empty() {
            return Err(ModeError::NoInstances);
        }
        if let Some(instance) = session.instances.iter().find(|i| i.game.is_empty()) {
            return Err(ModeError::InstanceWithoutGame(instance.id.clone()));
        }
        Ok(())
    }

    /// Keep the player's own instance, else hand out the first unheld one.
    ///
    /// When every instance is held the player gets nothing until capacity frees up.
    pub fn resolve_assignment(&self, session: &SessionState, player: &str) -> Assignment {
        if let Some(current) = session
            .players
            .get(player)
            .filter(|p| !p.instance_id.is_empty())
            .and_then(|p| session.instance(&p.instance_id))
        {
            return Assignment {
                game: current.game.clone(),
                instance_id: current.id.clone(),
            };
        }

        session
            .instances
            .iter()
            .find(|instance| session.holder_of(&instance.id).is_none())
            .map(|instance| Assignment {
                game: instance.game.clone(),
                instance_id: instance.id.clone(),
            })
            .unwrap_or_default()
    }

    /// Shuffle instances and deal them out one per player.
    ///
    /// Connected players are dealt first so absent players never crowd them out.
    pub(super) fn plan_swap(&self, session: &mut SessionState) -> Result<SwapPlan, ModeError> {
        if session.instances.is_empty() {
            return Err(ModeError::NoInstances);
        }

        let mut order: Vec<usize> = (0..session.instances.len()).collect();
        order.shuffle(&mut rng());

        let handoffs: Vec<(String, String)> = session
            .players
            .values()
            .filter(|p| p.connected && session.instance(&p.instance_id).is_some())
            .map(|p| (p.instance_id.clone(), p.name.clone()))
            .collect();

        let mut recipients: Vec<String> = session
            .players
            .values()
            .filter(|p| p.connected)
            .map(|p| p.name.clone())
            .collect();
        recipients.extend(
            session
                .players
                .values()
                .filter(|p| !p.connected)
                .map(|p| p.name.clone()),
        );

        session.clear_assignments();

        let mut plan = SwapPlan {
            handoffs,
            ..SwapPlan::default()
        };
        let mut dealt = order.into_iter();
        for name in recipients {
            let assignment = match dealt.next() {
                Some(index) => {
                    let instance = &session.instances[index];
                    Assignment {
                        game: instance.game.clone(),
                        instance_id: instance.id.clone(),
                    }
                }
                None => Assignment::none(),
            };

            let Some(player) = session.players.get_mut(&name) else {
                continue;
            };
            player.game = assignment.game.clone();
            player.instance_id = assignment.instance_id.clone();

            plan.assignments.push(PlayerAssignment {
                player: name.clone(),
                game: assignment.game.clone(),
                instance_id: assignment.instance_id.clone(),
            });
            if player.connected {
                plan.notify.push((name, assignment));
            }
        }
        Ok(plan)
    }

    /// Put `player` on `instance_id`, displacing its current holder.
    pub(super) fn plan_player_swap(
        &self,
        session: &mut SessionState,
        player: &str,
        instance_id: &str,
    ) -> Result<PlayerSwapPlan, ServiceError> {
        if instance_id.is_empty() {
            return Err(ServiceError::InvalidInput(
                "save mode swap requires an instance id".into(),
            ));
        }
        let Some(target) = session.players.get(player) else {
            return Err(ServiceError::NotFound(format!("player `{player}` not found")));
        };
        let previous_instance = target.instance_id.clone();
        let player_connected = target.connected;
        let game = session
            .instance(instance_id)
            .map(|instance| instance.game.clone())
            .ok_or_else(|| ServiceError::NotFound(format!("instance `{instance_id}` not found")))?;

        let mut plan = PlayerSwapPlan::default();

        let holder = session
            .holder_of(instance_id)
            .filter(|holder| *holder != player)
            .map(str::to_string);
        if let Some(holder) = holder {
            let displaced = session
                .players
                .get_mut(&holder)
                .map(|record| {
                    record.clear_assignment();
                    record.connected
                })
                .unwrap_or(false);
            if displaced {
                // The displaced client still has the latest save and must hand it over.
                if let Some(instance) = session.instance_mut(instance_id) {
                    instance.file_state = FileState::Pending;
                    instance.pending_player = holder.clone();
                }
                plan.displaced = Some(holder);
            }
        }

        if player_connected
            && previous_instance != instance_id
            && session.instance(&previous_instance).is_some()
        {
            plan.handoffs
                .push((previous_instance, player.to_string()));
        }

        if let Some(record) = session.players.get_mut(player) {
            record.game = game.clone();
            record.instance_id = instance_id.to_string();
        }
        plan.assignment = Assignment {
            game,
            instance_id: instance_id.to_string(),
        };
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::state::model::{GameSwapInstance, Player};

    fn session(players: &[(&str, bool)]) -> SessionState {
        let mut session = SessionState {
            instances: vec![
                GameSwapInstance::new("i1", "gameX"),
                GameSwapInstance::new("i2", "gameY"),
                GameSwapInstance::new("i3", "gameZ"),
            ],
            ..SessionState::default()
        };
        for (name, connected) in players {
            let mut player = Player::new(*name);
            player.connected = *connected;
            session.players.insert(name.to_string(), player);
        }
        session
    }

    fn held_ids(session: &SessionState) -> Vec<String> {
        session
            .players
            .values()
            .filter(|p| !p.instance_id.is_empty())
            .map(|p| p.instance_id.clone())
            .collect()
    }

    #[test]
    fn two_players_get_two_distinct_instances() {
        let mut state = session(&[("p1", true), ("p2", true)]);
        let plan = SaveMode.plan_swap(&mut state).unwrap();

        let held = held_ids(&state);
        assert_eq!(held.len(), 2);
        let distinct: HashSet<_> = held.iter().collect();
        assert_eq!(distinct.len(), 2);
        for id in &held {
            assert!(["i1", "i2", "i3"].contains(&id.as_str()));
            let instance = state.instance(id).unwrap();
            assert_eq!(state.players.values().find(|p| &p.instance_id == id).unwrap().game, instance.game);
        }
        assert_eq!(plan.notify.len(), 2);
        assert!(plan.handoffs.is_empty());
    }

    #[test]
    fn previous_connected_holders_hand_off() {
        let mut state = session(&[("p1", true), ("p2", false)]);
        state.players["p1"].instance_id = "i1".into();
        state.players["p1"].game = "gameX".into();
        state.players["p2"].instance_id = "i2".into();
        state.players["p2"].game = "gameY".into();

        let plan = SaveMode.plan_swap(&mut state).unwrap();
        assert_eq!(plan.handoffs, vec![("i1".to_string(), "p1".to_string())]);
    }

    #[test]
    fn surplus_players_stay_unassigned_and_connected_go_first() {
        let mut state = session(&[
            ("away", false),
            ("p1", true),
            ("p2", true),
            ("p3", true),
            ("p4", true),
        ]);
        let plan = SaveMode.plan_swap(&mut state).unwrap();

        assert_eq!(held_ids(&state).len(), 3);
        assert!(state.players["away"].instance_id.is_empty());
        assert_eq!(plan.assignments.len(), 5);
        // All four connected players are told something, the unlucky one to stop.
        assert_eq!(plan.notify.len(), 4);
        assert_eq!(
            plan.notify.iter().filter(|(_, a)| !a.is_some()).count(),
            1
        );
    }

    #[test]
    fn single_holder_holds_over_many_swaps() {
        let mut state = session(&[("p1", true), ("p2", true), ("p3", false), ("p4", true)]);
        for _ in 0..100 {
            SaveMode.plan_swap(&mut state).unwrap();
            let held = held_ids(&state);
            let distinct: HashSet<_> = held.iter().collect();
            assert_eq!(held.len(), distinct.len());
        }
    }

    #[test]
    fn resolve_keeps_own_instance_then_picks_first_free() {
        let mut state = session(&[("p1", true), ("p2", true)]);
        state.players["p1"].instance_id = "i1".into();
        state.players["p1"].game = "gameX".into();

        let own = SaveMode.resolve_assignment(&state, "p1");
        assert_eq!(own.instance_id, "i1");

        let fresh = SaveMode.resolve_assignment(&state, "p2");
        assert_eq!(fresh.instance_id, "i2");
        assert_eq!(fresh.game, "gameY");
    }

    #[test]
    fn resolve_gives_nothing_when_all_held() {
        let mut state = session(&[("a", true), ("b", true), ("c", true)]);
        for (name, id) in [("a", "i1"), ("b", "i2"), ("c", "i3")] {
            state.players[name].instance_id = id.into();
        }
        assert!(!SaveMode.resolve_assignment(&state, "late").is_some());
    }

    #[test]
    fn override_displaces_current_holder() {
        let mut state = session(&[("p1", true), ("p2", true)]);
        state.players["p1"].instance_id = "i1".into();
        state.players["p1"].game = "gameX".into();
        state.players["p2"].instance_id = "i2".into();
        state.players["p2"].game = "gameY".into();

        let plan = SaveMode.plan_player_swap(&mut state, "p2", "i1").unwrap();

        assert_eq!(plan.displaced.as_deref(), Some("p1"));
        assert!(state.players["p1"].instance_id.is_empty());
        assert_eq!(state.players["p2"].instance_id, "i1");
        assert_eq!(state.players["p2"].game, "gameX");
        let instance = state.instance("i1").unwrap();
        assert_eq!(instance.file_state, FileState::Pending);
        assert_eq!(instance.pending_player, "p1");
        assert_eq!(plan.handoffs, vec![("i2".to_string(), "p2".to_string())]);
    }

    #[test]
    fn override_rejects_unknown_targets() {
        let mut state = session(&[("p1", true)]);
        assert!(matches!(
            SaveMode.plan_player_swap(&mut state, "p1", "nope"),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            SaveMode.plan_player_swap(&mut state, "ghost", "i1"),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            SaveMode.plan_player_swap(&mut state, "p1", ""),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn setup_requires_instances_with_games() {
        let mut empty = SessionState::default();
        assert_eq!(SaveMode.setup_state(&mut empty), Err(ModeError::NoInstances));

        let mut broken = session(&[]);
        broken.instances[1].game.clear();
        assert_eq!(
            SaveMode.setup_state(&mut broken),
            Err(ModeError::InstanceWithoutGame("i2".into()))
        );
    }
}
