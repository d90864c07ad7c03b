use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        validation::validate_player_name,
        ws::{CommandTag, Envelope, GamesUpdateAckPayload, HelloPayload},
    },
    error::ServiceError,
    services::{
        file_state::refresh_from_disk,
        game_mode::GameModeHandler,
        messaging::{
            SendError, assignment_envelope, games_update_envelope, send_envelope,
            state_update_envelope,
        },
        replies::Reply,
        sse_events,
    },
    state::{PlayerSession, SharedState, model::Assignment, store::unix_millis},
};

/// One accepted socket: its session handle and, after `hello`, the player it speaks for.
pub struct Connection {
    session: PlayerSession,
    name: Option<String>,
}

impl Connection {
    /// Fresh connection, not yet bound to a player.
    pub fn new(session: PlayerSession) -> Self {
        Self {
            session,
            name: None,
        }
    }

    /// Player bound by the last successful `hello`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Outbound handle of this socket.
    pub fn session(&self) -> &PlayerSession {
        &self.session
    }
}

/// Handle the full lifecycle for an individual emulator client connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<Message>(state.config().outbound_queue_capacity.max(1));

    // Dedicated writer task keeps outbound messages and liveness pings flowing
    // even while we await inbound frames.
    let ping_every = state.config().ping_interval();
    let writer_task = tokio::spawn(async move {
        let mut pings = interval_at(Instant::now() + ping_every, ping_every);
        pings.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            let message = tokio::select! {
                next = outbound_rx.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
                _ = pings.tick() => ping_frame(),
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection::new(PlayerSession::new(outbound_tx.clone()));
    let shutdown = connection.session.shutdown.clone();
    let read_timeout = state.config().read_timeout();
    info!(session = %connection.session.id, "client connected");

    loop {
        let next = tokio::select! {
            _ = shutdown.notified() => {
                info!(session = %connection.session.id, "session superseded or removed");
                let _ = outbound_tx.try_send(Message::Close(None));
                break;
            }
            next = timeout(read_timeout, receiver.next()) => next,
        };

        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(err))) => {
                warn!(session = %connection.session.id, error = %err, "websocket error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    session = %connection.session.id,
                    player = connection.name().unwrap_or("-"),
                    "no read activity within {read_timeout:?}; dropping connection"
                );
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let envelope = match Envelope::from_json_str(text.as_str()) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(error = %err, "failed to parse client message");
                        continue;
                    }
                };
                if let Err(err) = dispatch_inbound(&state, &mut connection, envelope).await {
                    warn!(
                        player = connection.name().unwrap_or("-"),
                        error = %err,
                        "error while handling client message"
                    );
                    if matches!(err, ServiceError::Delivery(SendError::Closed)) {
                        break;
                    }
                }
            }
            Message::Pong(payload) => {
                if let (Some(name), Some(rtt)) = (connection.name(), round_trip_ms(&payload)) {
                    record_ping(&state, name, rtt).await;
                }
            }
            Message::Ping(payload) => {
                let _ = outbound_tx.try_send(Message::Pong(payload));
            }
            Message::Close(frame) => {
                info!(session = %connection.session.id, "client closed");
                let _ = outbound_tx.try_send(Message::Close(frame));
                break;
            }
            Message::Binary(_) => {}
        }
    }

    if let Some(name) = connection.name.take() {
        release_player(&state, &name, connection.session.id).await;
    }
    info!(session = %connection.session.id, "client disconnected");

    drop(connection);
    finalize(writer_task, outbound_tx).await;
}

/// Route one decoded envelope to its protocol action.
///
/// Tags the server only ever sends, or does not know, are logged and ignored.
pub async fn dispatch_inbound(
    state: &SharedState,
    connection: &mut Connection,
    envelope: Envelope,
) -> Result<(), ServiceError> {
    match envelope.cmd {
        CommandTag::Hello => {
            let hello: HelloPayload = envelope
                .payload_as()
                .map_err(|err| ServiceError::InvalidInput(format!("malformed hello: {err}")))?;
            validate_player_name(&hello.name).map_err(|err| {
                ServiceError::InvalidInput(format!("invalid player name `{}`: {err}", hello.name))
            })?;

            let renamed = connection
                .name
                .as_deref()
                .filter(|prev| *prev != hello.name)
                .map(str::to_string);
            if let Some(previous) = renamed {
                info!(from = %previous, to = %hello.name, "session renamed by hello");
                release_player(state, &previous, connection.session.id).await;
                connection.name = None;
            }
            establish_player(state, &hello.name, &connection.session).await;
            connection.name = Some(hello.name);
        }
        CommandTag::Ack => {
            state.replies().resolve(&envelope.id, Reply::Ack);
        }
        CommandTag::Nack => {
            let reason = envelope.nack_reason();
            debug!(id = %envelope.id, reason = %reason, "client nack");
            state.replies().resolve(&envelope.id, Reply::Nack(reason));
        }
        CommandTag::GamesUpdateAck => {
            let Some(name) = connection.name() else {
                warn!("games_update_ack before hello ignored");
                return Ok(());
            };
            let ack: GamesUpdateAckPayload = envelope.payload_as().map_err(|err| {
                ServiceError::InvalidInput(format!("malformed games_update_ack: {err}"))
            })?;
            set_has_files(state, name, ack.has_files).await;
        }
        CommandTag::Status => {
            let Some(name) = connection.name() else {
                warn!("status before hello ignored");
                return Ok(());
            };
            info!(player = %name, status = %envelope.payload, "client status");
            sse_events::broadcast_player_status(state, name, envelope.payload);
        }
        // Liveness runs on control frames; an application-level ping carries nothing we use.
        CommandTag::Ping => {
            debug!(player = connection.name().unwrap_or("-"), "ignoring application ping");
        }
        other => {
            debug!(
                player = connection.name().unwrap_or("-"),
                cmd = ?other,
                "ignoring unexpected client command"
            );
        }
    }
    Ok(())
}

/// Bind `name` to `session` and bring the client up to date.
///
/// Resolves the due assignment with the active mode, marks the player
/// connected and binds the session in one store mutation, then queues the
/// catalog, a state summary, a `start` when there is something to play and a
/// first liveness ping. A previous session bound to the same name is told to
/// hang up.
///
/// Once bound, the player stays bound: the initial pushes are best-effort and a
/// full queue only costs the client those frames.
pub async fn establish_player(
    state: &SharedState,
    name: &str,
    session: &PlayerSession,
) -> Assignment {
    let (assignment, replaced) = state
        .store()
        .update(|s| {
            let assignment = GameModeHandler::for_mode(s.mode).resolve_assignment(s, name);
            let player = s.player_entry(name);
            player.connected = true;
            player.game = assignment.game.clone();
            player.instance_id = assignment.instance_id.clone();
            // Bound under the store lock so a stale release cannot land in between.
            let replaced = state
                .bind_session(name, session.clone())
                .filter(|old| old.id != session.id);
            (assignment, replaced)
        })
        .await;

    if let Some(old) = replaced {
        info!(player = %name, old = %old.id, new = %session.id, "replacing previous session");
        old.shutdown.notify_one();
    }

    if !assignment.instance_id.is_empty() {
        refresh_from_disk(state, &assignment.instance_id).await;
    }

    let (catalog, summary) = state
        .store()
        .read(|s| (games_update_envelope(s), state_update_envelope(s, name)))
        .await;
    push_initial(session, name, catalog);
    push_initial(session, name, summary);
    if assignment.is_some() {
        push_initial(
            session,
            name,
            assignment_envelope(CommandTag::Start, &assignment),
        );
    }
    if session.tx.try_send(ping_frame()).is_err() {
        debug!(player = %name, "initial ping not queued");
    }

    info!(
        player = %name,
        game = %assignment.game,
        instance = %assignment.instance_id,
        "player connected"
    );
    sse_events::broadcast_player_connection(state, name, true);
    assignment
}

fn push_initial(session: &PlayerSession, name: &str, envelope: Result<Envelope, SendError>) {
    let result = envelope.and_then(|envelope| send_envelope(&session.tx, &envelope));
    if let Err(err) = result {
        warn!(player = %name, error = %err, "initial push dropped");
    }
}

/// Undo [`establish_player`] for `session_id`, unless a newer session took the name over.
///
/// The unbind and the `connected` flag change together under the store lock.
pub async fn release_player(state: &SharedState, name: &str, session_id: Uuid) -> bool {
    let released = state
        .store()
        .update(|s| {
            if !state.unbind_session(name, session_id) {
                return false;
            }
            if let Some(player) = s.players.get_mut(name) {
                player.connected = false;
            }
            true
        })
        .await;
    if !released {
        debug!(player = %name, "session already replaced; keeping player connected");
        return false;
    }
    info!(player = %name, "player disconnected");
    sse_events::broadcast_player_connection(state, name, false);
    true
}

/// Store the latest round-trip measurement.
pub async fn record_ping(state: &SharedState, name: &str, rtt_ms: u64) {
    let changed = state
        .store()
        .read(|s| s.players.get(name).is_some_and(|p| p.ping_ms != rtt_ms))
        .await;
    if changed {
        state
            .store()
            .update(|s| {
                if let Some(player) = s.players.get_mut(name) {
                    player.ping_ms = rtt_ms;
                }
            })
            .await;
    }
}

async fn set_has_files(state: &SharedState, name: &str, has_files: bool) {
    state
        .store()
        .update(|s| {
            if let Some(player) = s.players.get_mut(name) {
                player.has_files = has_files;
            }
        })
        .await;
    debug!(player = %name, has_files, "client reported game assets");
}

/// Control-level ping carrying the send time as big-endian unix millis.
fn ping_frame() -> Message {
    Message::Ping(Bytes::copy_from_slice(&unix_millis().to_be_bytes()))
}

/// Round trip from an echoed ping timestamp; `None` for foreign payloads.
fn round_trip_ms(payload: &[u8]) -> Option<u64> {
    let sent = i64::from_be_bytes(payload.try_into().ok()?);
    u64::try_from(unix_millis() - sent).ok()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::Sender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
