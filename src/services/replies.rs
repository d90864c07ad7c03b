//! Correlation of outbound commands with their `ack`/`nack`.
//!
//! Each waiting caller owns exactly one reply slot keyed by the command id. The
//! slot is released when the caller returns, whatever the outcome, and a
//! per-registration token keeps a late release from evicting a newer waiter
//! that reused the same id.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    dto::ws::Envelope,
    services::messaging::{SendError, send_to_player},
    state::AppState,
};

/// Client answer to a correlated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nack(String),
}

/// Why a correlated wait ended without a reply.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The command never left: the client could not be reached.
    #[error(transparent)]
    Delivery(#[from] SendError),
    /// The client never answered.
    #[error("no reply within {timeout:?}")]
    Timeout { timeout: Duration },
    /// The reply slot was replaced by another waiter with the same id.
    #[error("reply slot dropped")]
    Dropped,
}

struct PendingReply {
    token: u64,
    tx: oneshot::Sender<Reply>,
}

/// Pending reply slots keyed by command id.
#[derive(Default)]
pub struct ReplyRegistry {
    pending: DashMap<String, PendingReply>,
    next_token: AtomicU64,
}

impl ReplyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, id: &str) -> Registration<'_> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(id.to_string(), PendingReply { token, tx });
        Registration {
            registry: self,
            id: id.to_string(),
            token,
            rx: Some(rx),
        }
    }

    /// Hand `reply` to whoever waits on `id`. Returns false if nobody does.
    pub fn resolve(&self, id: &str, reply: Reply) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => pending.tx.send(reply).is_ok(),
            None => {
                debug!(id = %id, "reply for unknown or expired command");
                false
            }
        }
    }

    /// Whether someone still waits on `id`.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of outstanding waits.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Scope guard over one reply slot.
struct Registration<'a> {
    registry: &'a ReplyRegistry,
    id: String,
    token: u64,
    rx: Option<oneshot::Receiver<Reply>>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry
            .pending
            .remove_if(&self.id, |_, pending| pending.token == self.token);
    }
}

/// Send `envelope` to `player` and wait for the matching `ack`/`nack`.
///
/// The reply slot is registered before transmitting so a fast client cannot
/// answer before anyone listens.
pub async fn send_and_wait(
    state: &AppState,
    player: &str,
    envelope: &Envelope,
    timeout: Duration,
) -> Result<Reply, WaitError> {
    let mut registration = state.replies().register(&envelope.id);
    send_to_player(state, player, envelope)?;

    let Some(rx) = registration.rx.take() else {
        return Err(WaitError::Dropped);
    };
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(WaitError::Dropped),
        Err(_) => Err(WaitError::Timeout { timeout }),
    }
}
