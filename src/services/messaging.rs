//! Outbound delivery onto per-session queues.
//!
//! Queues are bounded and never awaited: a full queue is reported to the caller
//! as a transient failure instead of stalling the task that produced the command.

use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::{
    dto::ws::{
        AssignmentPayload, CommandTag, Envelope, GamesUpdatePayload, StateUpdatePayload,
    },
    state::{
        AppState,
        model::{Assignment, SessionState},
    },
};

/// Transient failures when pushing a command to a client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("player `{0}` has no live session")]
    NotConnected(String),
    #[error("outbound queue is full")]
    QueueFull,
    #[error("session is closed")]
    Closed,
    #[error("failed to encode command: {0}")]
    Encode(String),
}

/// Serialize an envelope and queue it on a session's writer channel.
pub fn send_envelope(tx: &mpsc::Sender<Message>, envelope: &Envelope) -> Result<(), SendError> {
    let text = serde_json::to_string(envelope).map_err(|err| SendError::Encode(err.to_string()))?;
    tx.try_send(Message::Text(text.into()))
        .map_err(|err| match err {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::Closed,
        })
}

/// Queue `envelope` for the session bound to `player`.
pub fn send_to_player(state: &AppState, player: &str, envelope: &Envelope) -> Result<(), SendError> {
    let tx = state
        .sessions()
        .get(player)
        .map(|session| session.tx.clone())
        .ok_or_else(|| SendError::NotConnected(player.to_string()))?;
    send_envelope(&tx, envelope)?;
    debug!(player = %player, cmd = ?envelope.cmd, id = %envelope.id, "queued command");
    Ok(())
}

/// Build a `start` or `swap` command for an assignment.
pub fn assignment_envelope(tag: CommandTag, assignment: &Assignment) -> Result<Envelope, SendError> {
    Envelope::command(
        tag,
        &AssignmentPayload {
            game: assignment.game.clone(),
            instance_id: assignment.instance_id.clone(),
        },
    )
    .map_err(|err| SendError::Encode(err.to_string()))
}

/// Catalog snapshot command.
pub fn games_update_envelope(state: &SessionState) -> Result<Envelope, SendError> {
    Envelope::command(
        CommandTag::GamesUpdate,
        &GamesUpdatePayload {
            games: state.games.clone(),
            main_games: state.main_games.clone(),
        },
    )
    .map_err(|err| SendError::Encode(err.to_string()))
}

/// Session summary command, personalised with `player`'s completed sets.
pub fn state_update_envelope(state: &SessionState, player: &str) -> Result<Envelope, SendError> {
    let (completed_games, completed_instances) = state
        .players
        .get(player)
        .map(|p| {
            (
                p.completed_games.iter().cloned().collect(),
                p.completed_instances.iter().cloned().collect(),
            )
        })
        .unwrap_or_default();

    Envelope::command(
        CommandTag::StateUpdate,
        &StateUpdatePayload {
            running: state.running,
            swap_enabled: state.swap_enabled,
            mode: state.mode,
            next_swap_at: state.next_swap_at,
            updated_at: state.updated_at,
            completed_games,
            completed_instances,
        },
    )
    .map_err(|err| SendError::Encode(err.to_string()))
}

/// Send one command per live session, built by `build`; failures are logged only.
///
/// Returns how many sessions accepted the command.
pub fn broadcast<F>(state: &AppState, mut build: F) -> usize
where
    F: FnMut(&str) -> Result<Envelope, SendError>,
{
    let names: Vec<String> = state
        .sessions()
        .iter()
        .map(|entry| entry.key().clone())
        .collect();

    let mut delivered = 0;
    for name in names {
        let result = build(&name).and_then(|envelope| send_to_player(state, &name, &envelope));
        match result {
            Ok(()) => delivered += 1,
            Err(err) => warn!(player = %name, error = %err, "broadcast delivery failed"),
        }
    }
    delivered
}

/// Push a `state_update` to every live session.
pub async fn broadcast_state_update(state: &AppState) -> usize {
    let snapshot = state.store().snapshot().await;
    broadcast(state, |name| state_update_envelope(&snapshot, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{PlayerSession, model::Player},
    };

    fn decode(message: Message) -> Envelope {
        match message {
            Message::Text(text) => Envelope::from_json_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_player_is_not_connected() {
        let state = AppState::new(AppConfig::default(), SessionState::default());
        let err = send_to_player(&state, "nobody", &Envelope::bare(CommandTag::Pause)).unwrap_err();
        assert_eq!(err, SendError::NotConnected("nobody".into()));
    }

    #[tokio::test]
    async fn full_queue_fails_fast() {
        let state = AppState::new(AppConfig::default(), SessionState::default());
        let (tx, _rx) = mpsc::channel(1);
        state.bind_session("alice", PlayerSession::new(tx));

        send_to_player(&state, "alice", &Envelope::bare(CommandTag::Pause)).unwrap();
        let err = send_to_player(&state, "alice", &Envelope::bare(CommandTag::Pause)).unwrap_err();
        assert_eq!(err, SendError::QueueFull);
    }

    #[tokio::test]
    async fn closed_session_is_reported() {
        let state = AppState::new(AppConfig::default(), SessionState::default());
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        state.bind_session("alice", PlayerSession::new(tx));
        let err = send_to_player(&state, "alice", &Envelope::bare(CommandTag::Reset)).unwrap_err();
        assert_eq!(err, SendError::Closed);
    }

    #[tokio::test]
    async fn state_update_carries_player_completions() {
        let mut session = SessionState::default();
        let mut alice = Player::new("alice");
        alice.completed_games.insert("a.nes".into());
        session.players.insert("alice".into(), alice);
        let state = AppState::new(AppConfig::default(), session);
        let (tx, mut rx) = mpsc::channel(4);
        state.bind_session("alice", PlayerSession::new(tx));

        assert_eq!(broadcast_state_update(&state).await, 1);

        let envelope = decode(rx.recv().await.unwrap());
        assert_eq!(envelope.cmd, CommandTag::StateUpdate);
        let payload: StateUpdatePayload = envelope.payload_as().unwrap();
        assert_eq!(payload.completed_games, vec!["a.nes".to_string()]);
    }
}
