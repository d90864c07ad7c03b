//! The client session loop over a real socket: liveness, read deadline and close.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use swap_conductor::{
    config::AppConfig,
    routes,
    state::{AppState, SharedState, model::SessionState, store::unix_millis},
};

fn quiet_state() -> SharedState {
    AppState::new(
        AppConfig {
            read_timeout_secs: 1,
            ping_interval_secs: 30,
            ..AppConfig::default()
        },
        SessionState {
            games: vec!["a.nes".into(), "b.nes".into()],
            ..SessionState::default()
        },
    )
}

async fn serve(state: SharedState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

fn hello(name: &str) -> Message {
    Message::text(json!({ "cmd": "hello", "payload": { "name": name }, "id": "" }).to_string())
}

/// Poll the store until `check` holds, giving up after a few seconds.
async fn eventually(state: &SharedState, check: impl Fn(&SessionState) -> bool) -> bool {
    for _ in 0..50 {
        if state.store().read(|s| check(s)).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

fn is_connected(name: &'static str) -> impl Fn(&SessionState) -> bool {
    move |s| s.players.get(name).is_some_and(|p| p.connected)
}

#[tokio::test]
async fn pong_round_trip_lands_on_the_player() {
    let state = quiet_state();
    let url = serve(state.clone()).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    ws.send(hello("alice")).await.unwrap();
    assert!(eventually(&state, is_connected("alice")).await);

    let sent = (unix_millis() - 40).to_be_bytes();
    ws.send(Message::Pong(sent.to_vec().into())).await.unwrap();
    assert!(
        eventually(&state, |s| s
            .players
            .get("alice")
            .is_some_and(|p| (40..5_000).contains(&p.ping_ms)))
        .await
    );
}

#[tokio::test]
async fn silent_client_is_dropped_after_read_deadline() {
    let state = quiet_state();
    let url = serve(state.clone()).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    ws.send(hello("bob")).await.unwrap();
    assert!(eventually(&state, is_connected("bob")).await);

    // Keep the socket open but say nothing.
    assert!(eventually(&state, |s| !is_connected("bob")(s)).await);
    assert!(!state.sessions().contains_key("bob"));
    drop(ws);
}

#[tokio::test]
async fn close_frame_disconnects_the_player() {
    let state = quiet_state();
    let url = serve(state.clone()).await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    ws.send(hello("carol")).await.unwrap();
    assert!(eventually(&state, is_connected("carol")).await);

    ws.send(Message::Close(None)).await.unwrap();
    // Drain whatever the server sent until it closes its side.
    while let Some(Ok(_)) = ws.next().await {}
    assert!(eventually(&state, |s| !is_connected("carol")(s)).await);
    assert!(!state.sessions().contains_key("carol"));
}
