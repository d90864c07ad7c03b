//! Single source of truth for the session state.
//!
//! All writers funnel through [`StateStore::update`] (or its fallible sibling),
//! which holds the write lock for the duration of the mutator, stamps
//! `updated_at`, and publishes the new stamp on a watch channel. The persistence
//! task and admin listeners subscribe to that channel.

use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};

use crate::state::model::SessionState;

/// Current wall-clock time in unix milliseconds.
pub fn unix_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Lock-guarded owner of [`SessionState`].
pub struct StateStore {
    state: RwLock<SessionState>,
    updates: watch::Sender<i64>,
    initial_stamp: i64,
}

impl StateStore {
    /// Take ownership of `initial`, typically the state just loaded from disk.
    pub fn new(initial: SessionState) -> Self {
        let initial_stamp = initial.updated_at;
        let (updates, _rx) = watch::channel(initial_stamp);
        Self {
            state: RwLock::new(initial),
            updates,
            initial_stamp,
        }
    }

    /// `updated_at` of the state the store was created with.
    pub fn initial_stamp(&self) -> i64 {
        self.initial_stamp
    }

    /// Independent copy of the whole state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Run `f` against the current state under the read lock.
    ///
    /// Cheaper than [`snapshot`](Self::snapshot) when only a projection is needed.
    pub async fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&SessionState) -> T,
    {
        let guard = self.state.read().await;
        f(&guard)
    }

    /// Mutate the state exclusively, then stamp and publish the change.
    ///
    /// `f` must not block or call back into the store: the write lock is held
    /// while it runs.
    pub async fn update<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut SessionState) -> T,
    {
        let mut guard = self.state.write().await;
        let out = f(&mut guard);
        let stamp = next_stamp(guard.updated_at);
        guard.updated_at = stamp;
        drop(guard);
        self.updates.send_replace(stamp);
        out
    }

    /// Like [`update`](Self::update), but all-or-nothing: the mutator works on a
    /// draft which only replaces the state when it returns `Ok`.
    pub async fn try_update<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SessionState) -> Result<T, E>,
    {
        let mut guard = self.state.write().await;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        draft.updated_at = next_stamp(guard.updated_at);
        let stamp = draft.updated_at;
        *guard = draft;
        drop(guard);
        self.updates.send_replace(stamp);
        Ok(out)
    }

    /// Receiver notified with the new `updated_at` after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.updates.subscribe()
    }

    /// Stamp of the last mutation.
    pub fn updated_at(&self) -> i64 {
        *self.updates.borrow()
    }
}

/// Wall clock, but never behind the previous stamp.
fn next_stamp(previous: i64) -> i64 {
    unix_millis().max(previous + 1)
}
