//! Debounced, crash-safe persistence of the session state.
//!
//! The store publishes its stamp after every mutation; this task waits for the
//! stream of stamps to go quiet for the debounce interval and then writes the
//! latest snapshot once. Intermediate states may never reach disk.

use std::{future::Future, time::Duration};

use tokio::{sync::watch, time::timeout};
use tracing::{info, warn};

use crate::{
    dao::{
        state_file,
        storage::{StorageError, StorageResult},
    },
    state::{AppState, SharedState},
};

/// Persist the state whenever it changes, until the store goes away.
pub async fn run(state: SharedState) {
    let debounce = state.config().persist_debounce();
    let mut changes = state.store().subscribe();
    // Mutations made before this task subscribed still need a write.
    let unsaved = *changes.borrow() != state.store().initial_stamp();
    if unsaved {
        changes.mark_changed();
    }
    debounce_changes(changes, debounce, || {
        let state = state.clone();
        async move {
            match persist_now(&state).await {
                Ok(()) => {
                    if state.is_degraded() {
                        info!("state persistence recovered");
                    }
                    state.update_degraded(false);
                }
                Err(err) => {
                    warn!(error = %err, "failed to persist state; keeping in-memory copy");
                    state.update_degraded(true);
                }
            }
        }
    })
    .await;
}

/// Call `flush` once per burst of changes, after `debounce` without a new one.
///
/// Every change restarts the timer. When the sender is dropped mid-burst the
/// pending flush still happens before returning.
pub async fn debounce_changes<F, Fut>(
    mut changes: watch::Receiver<i64>,
    debounce: Duration,
    mut flush: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while changes.changed().await.is_ok() {
        loop {
            match timeout(debounce, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    flush().await;
                    return;
                }
                Err(_) => break,
            }
        }
        flush().await;
    }
}

/// Write the current snapshot immediately, unless a plugin is in error status.
pub async fn persist_now(state: &AppState) -> StorageResult<()> {
    let errored = state.plugins().errored_plugins();
    if !errored.is_empty() {
        return Err(StorageError::Vetoed(errored));
    }
    let snapshot = state.store().snapshot().await;
    let config = state.config();
    state_file::write_atomic(&config.state_path, &snapshot, config.persist_rename_attempts).await
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::plugins::PluginRegistry,
        state::model::{Player, SessionState},
    };

    #[tokio::test]
    async fn bursts_collapse_into_one_flush() {
        let (tx, rx) = watch::channel(0_i64);
        let flushes = Arc::new(AtomicUsize::new(0));

        let task = {
            let flushes = flushes.clone();
            tokio::spawn(debounce_changes(rx, Duration::from_millis(100), move || {
                let flushes = flushes.clone();
                async move {
                    flushes.fetch_add(1, Ordering::SeqCst);
                }
            }))
        };

        for stamp in 1..=5 {
            tx.send_replace(stamp);
            sleep(Duration::from_millis(10)).await;
        }
        sleep(Duration::from_millis(300)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 1);

        tx.send_replace(6);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 2);

        drop(tx);
        task.await.unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pending_burst_is_flushed_when_sender_drops() {
        let (tx, rx) = watch::channel(0_i64);
        let flushes = Arc::new(AtomicUsize::new(0));
        let task = {
            let flushes = flushes.clone();
            tokio::spawn(debounce_changes(rx, Duration::from_secs(10), move || {
                let flushes = flushes.clone();
                async move {
                    flushes.fetch_add(1, Ordering::SeqCst);
                }
            }))
        };

        tx.send_replace(1);
        sleep(Duration::from_millis(20)).await;
        drop(tx);
        task.await.unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }

    struct BrokenPlugin;

    impl PluginRegistry for BrokenPlugin {
        fn errored_plugins(&self) -> Vec<String> {
            vec!["autosplitter".into()]
        }
    }

    #[tokio::test]
    async fn errored_plugin_vetoes_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            state_path: dir.path().join("state.json"),
            ..AppConfig::default()
        };
        let state = AppState::with_plugins(config, SessionState::default(), Arc::new(BrokenPlugin));

        let err = persist_now(&state).await.unwrap_err();
        assert!(matches!(err, StorageError::Vetoed(names) if names == vec!["autosplitter"]));
        assert!(!dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn untouched_state_is_not_rewritten_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let config = AppConfig {
            state_path: path.clone(),
            persist_debounce_ms: 30,
            ..AppConfig::default()
        };
        let state = AppState::new(config, SessionState::default());
        let task = tokio::spawn(run(state.clone()));
        sleep(Duration::from_millis(200)).await;
        assert!(!path.exists());
        task.abort();
    }

    #[tokio::test]
    async fn run_writes_the_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let config = AppConfig {
            state_path: path.clone(),
            persist_debounce_ms: 30,
            ..AppConfig::default()
        };
        let state = AppState::new(config, SessionState::default());
        // Mutate before the writer task gets to subscribe.
        let task = tokio::spawn(run(state.clone()));

        for name in ["a", "b", "c"] {
            state
                .store()
                .update(|s| {
                    s.players.insert(name.into(), Player::new(name));
                })
                .await;
        }
        sleep(Duration::from_millis(300)).await;

        let on_disk = state_file::load(&path).await.unwrap().expect("written");
        assert_eq!(on_disk, state.store().snapshot().await);
        assert!(!state.is_degraded());
        task.abort();
    }
}
