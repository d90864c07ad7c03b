//! End-to-end flows through the public library API: clients handshake over the
//! protocol dispatcher, swaps run through the mode handlers, replies resolve
//! through the correlation registry and state survives a reload.

use std::{collections::HashSet, time::Duration};

use axum::extract::ws::Message;
use serde_json::json;
use tokio::sync::mpsc;

use swap_conductor::{
    config::AppConfig,
    dao::{save_files::SaveFiles, state_file},
    dto::ws::{AssignmentPayload, CommandTag, Envelope},
    error::ServiceError,
    services::{
        game_mode::GameModeHandler,
        persistence,
        websocket_service::{Connection, dispatch_inbound},
    },
    state::{
        AppState, PlayerSession, SharedState,
        model::{FileState, GameMode, GameSwapInstance, SessionState},
    },
};

struct Client {
    conn: Connection,
    rx: mpsc::Receiver<Message>,
}

impl Client {
    async fn hello(state: &SharedState, name: &str) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let mut conn = Connection::new(PlayerSession::new(tx));
        let hello = Envelope::command(CommandTag::Hello, &json!({ "name": name })).unwrap();
        dispatch_inbound(state, &mut conn, hello).await.unwrap();
        let mut client = Self { conn, rx };
        client.drain();
        client
    }

    fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                out.push(Envelope::from_json_str(text.as_str()).unwrap());
            }
        }
        out
    }

    async fn next_command(&mut self, tag: CommandTag) -> Envelope {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("command within deadline")
                .expect("session open");
            if let Message::Text(text) = message {
                let envelope = Envelope::from_json_str(text.as_str()).unwrap();
                if envelope.cmd == tag {
                    return envelope;
                }
            }
        }
    }

    async fn answer(&mut self, state: &SharedState, cmd: CommandTag, id: &str, payload: serde_json::Value) {
        let reply = Envelope {
            cmd,
            payload,
            id: id.to_string(),
        };
        dispatch_inbound(state, &mut self.conn, reply).await.unwrap();
    }
}

fn config_in(dir: &tempfile::TempDir) -> AppConfig {
    AppConfig {
        state_path: dir.path().join("state.json"),
        saves_dir: dir.path().join("saves"),
        ack_timeout_secs: 1,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn sync_swap_puts_connected_players_on_one_game() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        config_in(&dir),
        SessionState {
            games: vec!["a".into(), "b".into(), "c".into()],
            ..SessionState::default()
        },
    );
    let mut alice = Client::hello(&state, "alice").await;
    let mut bob = Client::hello(&state, "bob").await;
    let before = state.store().updated_at();

    let assignments = GameModeHandler::for_mode(GameMode::Sync)
        .handle_swap(&state)
        .await
        .unwrap();

    assert_eq!(assignments.len(), 2);
    let snapshot = state.store().snapshot().await;
    let game = snapshot.players["alice"].game.clone();
    assert!(["a", "b", "c"].contains(&game.as_str()));
    assert_eq!(snapshot.players["bob"].game, game);
    assert!(snapshot.updated_at > before);

    for client in [&mut alice, &mut bob] {
        let swap = client.next_command(CommandTag::Swap).await;
        let payload: AssignmentPayload = swap.payload_as().unwrap();
        assert_eq!(payload.game, game);
    }
}

#[tokio::test]
async fn save_swap_deals_distinct_instances_and_marks_handoffs() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        config_in(&dir),
        SessionState {
            mode: GameMode::Save,
            instances: vec![
                GameSwapInstance::new("i1", "gameX"),
                GameSwapInstance::new("i2", "gameY"),
                GameSwapInstance::new("i3", "gameZ"),
            ],
            ..SessionState::default()
        },
    );
    let _p1 = Client::hello(&state, "p1").await;
    let _p2 = Client::hello(&state, "p2").await;

    // Both got an instance on connect; a swap moves their saves around.
    let held_before: HashSet<String> = state
        .store()
        .read(|s| s.players.values().map(|p| p.instance_id.clone()).collect())
        .await;
    assert_eq!(held_before.len(), 2);

    GameModeHandler::active(&state)
        .await
        .handle_swap(&state)
        .await
        .unwrap();

    let snapshot = state.store().snapshot().await;
    let held: Vec<&str> = snapshot
        .players
        .values()
        .map(|p| p.instance_id.as_str())
        .filter(|id| !id.is_empty())
        .collect();
    assert_eq!(held.len(), 2);
    assert_eq!(held.iter().collect::<HashSet<_>>().len(), 2);
    assert_eq!(
        snapshot
            .instances
            .iter()
            .filter(|i| snapshot.holder_of(&i.id).is_none())
            .count(),
        1
    );
    for id in &held_before {
        let instance = snapshot.instance(id).unwrap();
        assert_eq!(instance.file_state, FileState::Pending);
        assert!(!instance.pending_player.is_empty());
    }
}

#[tokio::test]
async fn repeated_hello_resolves_the_same_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        config_in(&dir),
        SessionState {
            mode: GameMode::Save,
            instances: vec![
                GameSwapInstance::new("i1", "gameX"),
                GameSwapInstance::new("i2", "gameY"),
            ],
            ..SessionState::default()
        },
    );
    let mut client = Client::hello(&state, "p1").await;
    let first = state.store().read(|s| s.players["p1"].instance_id.clone()).await;

    let hello = Envelope::command(CommandTag::Hello, &json!({ "name": "p1" })).unwrap();
    dispatch_inbound(&state, &mut client.conn, hello).await.unwrap();

    let second = state.store().read(|s| s.players["p1"].instance_id.clone()).await;
    assert_eq!(first, second);
    let start = client.next_command(CommandTag::Start).await;
    let payload: AssignmentPayload = start.payload_as().unwrap();
    assert_eq!(payload.instance_id, first);
}

#[tokio::test]
async fn player_override_waits_for_ack_and_surfaces_nack() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        config_in(&dir),
        SessionState {
            games: vec!["a".into(), "b".into()],
            ..SessionState::default()
        },
    );
    let mut client = Client::hello(&state, "alice").await;
    let handler = GameModeHandler::for_mode(GameMode::Sync);

    let swap = {
        let state = state.clone();
        tokio::spawn(async move { handler.handle_player_swap(&state, "alice", "b", "").await })
    };
    let command = client.next_command(CommandTag::Swap).await;
    client.answer(&state, CommandTag::Ack, &command.id, serde_json::Value::Null).await;
    let response = swap.await.unwrap().unwrap();
    assert!(response.acknowledged);
    assert_eq!(response.game, "b");

    let swap = {
        let state = state.clone();
        tokio::spawn(async move { handler.handle_player_swap(&state, "alice", "a", "").await })
    };
    let command = client.next_command(CommandTag::Swap).await;
    client
        .answer(&state, CommandTag::Nack, &command.id, json!({ "reason": "rom missing" }))
        .await;
    let err = swap.await.unwrap().unwrap_err();
    assert!(matches!(err, ServiceError::Rejected(reason) if reason == "rom missing"));
    assert!(state.replies().is_empty());
}

#[tokio::test]
async fn unanswered_override_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        config_in(&dir),
        SessionState {
            games: vec!["a".into(), "b".into()],
            ..SessionState::default()
        },
    );
    let _client = Client::hello(&state, "alice").await;

    let err = GameModeHandler::for_mode(GameMode::Sync)
        .handle_player_swap(&state, "alice", "a", "")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Timeout));
    assert!(state.replies().is_empty());
    // The override itself is not rolled back.
    assert_eq!(state.store().read(|s| s.players["alice"].game.clone()).await, "a");
}

#[tokio::test]
async fn persisted_state_reloads_disconnected_and_reconciled() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let state = AppState::new(
        config.clone(),
        SessionState {
            mode: GameMode::Save,
            instances: vec![
                GameSwapInstance::new("i1", "gameX"),
                GameSwapInstance::new("i2", "gameY"),
            ],
            ..SessionState::default()
        },
    );
    let _client = Client::hello(&state, "p1").await;
    state.saves().write("i2", b"save").await.unwrap();
    state
        .store()
        .update(|s| {
            if let Some(instance) = s.instance_mut("i1") {
                instance.file_state = FileState::Ready;
            }
        })
        .await;
    persistence::persist_now(&state).await.unwrap();
    let before = state.store().snapshot().await;

    let mut reloaded = state_file::load(&config.state_path).await.unwrap().unwrap();
    let saves = SaveFiles::new(config.saves_dir.clone());
    reloaded.reconcile_after_load(|id| saves.exists(id));

    assert!(reloaded.players.values().all(|p| !p.connected));
    assert_eq!(reloaded.instance("i1").unwrap().file_state, FileState::None);
    assert_eq!(reloaded.instance("i2").unwrap().file_state, FileState::Ready);
    assert_eq!(reloaded.players["p1"].instance_id, before.players["p1"].instance_id);
    assert_eq!(reloaded.mode, before.mode);
    assert_eq!(reloaded.updated_at, before.updated_at);
}
