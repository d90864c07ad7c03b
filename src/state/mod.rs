/// Serializable session model.
pub mod model;
mod sse;
/// Lock-guarded store with change notifications.
pub mod store;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Notify, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        plugins::{NoPlugins, PluginRegistry},
        save_files::SaveFiles,
    },
    services::replies::ReplyRegistry,
    state::{model::SessionState, store::StateStore},
};

pub use self::sse::SseHub;

/// Shared handle passed to handlers and tasks.
pub type SharedState = Arc<AppState>;

const EVENT_HUB_CAPACITY: usize = 64;

/// Handle used to push messages to one connected client.
#[derive(Clone)]
pub struct PlayerSession {
    /// Distinguishes successive connections bound to the same player name.
    pub id: Uuid,
    /// Bounded queue drained by the socket writer.
    pub tx: mpsc::Sender<Message>,
    /// Fired to make the session's reader loop hang up.
    pub shutdown: Arc<Notify>,
}

impl PlayerSession {
    /// New session with a fresh id.
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            shutdown: Arc::new(Notify::new()),
        }
    }
}

/// Central application state: the store plus everything attached to live sessions.
pub struct AppState {
    config: AppConfig,
    store: StateStore,
    sessions: DashMap<String, PlayerSession>,
    replies: ReplyRegistry,
    scheduler_wake: Notify,
    saves: SaveFiles,
    plugins: Arc<dyn PluginRegistry>,
    events: SseHub,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, initial: SessionState) -> SharedState {
        Self::with_plugins(config, initial, Arc::new(NoPlugins))
    }

    /// Same as [`AppState::new`] with an explicit plugin registry.
    pub fn with_plugins(
        config: AppConfig,
        initial: SessionState,
        plugins: Arc<dyn PluginRegistry>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        let saves = SaveFiles::new(config.saves_dir.clone());
        Arc::new(Self {
            config,
            store: StateStore::new(initial),
            sessions: DashMap::new(),
            replies: ReplyRegistry::new(),
            scheduler_wake: Notify::new(),
            saves,
            plugins,
            events: SseHub::new(EVENT_HUB_CAPACITY),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The authoritative session state.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Live sessions keyed by player name.
    pub fn sessions(&self) -> &DashMap<String, PlayerSession> {
        &self.sessions
    }

    /// Outstanding correlated commands awaiting ack/nack.
    pub fn replies(&self) -> &ReplyRegistry {
        &self.replies
    }

    /// Save artifact storage.
    pub fn saves(&self) -> &SaveFiles {
        &self.saves
    }

    /// Plugin registry consulted before each state write.
    pub fn plugins(&self) -> &dyn PluginRegistry {
        self.plugins.as_ref()
    }

    /// Broadcast hub used for the admin event stream.
    pub fn events(&self) -> &SseHub {
        &self.events
    }

    /// Signal the scheduler loop to re-evaluate immediately.
    pub fn wake_scheduler(&self) {
        self.scheduler_wake.notify_one();
    }

    /// Wake-up signal awaited by the scheduler.
    pub fn scheduler_wake(&self) -> &Notify {
        &self.scheduler_wake
    }

    /// Bind `name` to `session`, returning the session it replaced.
    pub fn bind_session(&self, name: &str, session: PlayerSession) -> Option<PlayerSession> {
        self.sessions.insert(name.to_string(), session)
    }

    /// Remove the mapping for `name` only if it still points at `session_id`.
    pub fn unbind_session(&self, name: &str, session_id: Uuid) -> bool {
        self.sessions
            .remove_if(name, |_, session| session.id == session_id)
            .is_some()
    }

    /// Remove the mapping for `name` and make that session hang up.
    pub fn drop_session(&self, name: &str) -> bool {
        match self.sessions.remove(name) {
            Some((_, session)) => {
                session.shutdown.notify_one();
                true
            }
            None => false,
        }
    }

    /// Current degraded flag: true while the last state write failed.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
