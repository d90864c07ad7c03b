//! Readiness of per-instance save artifacts.
//!
//! `None` → `Pending` when a swap hands an instance to someone new, `Pending` →
//! `Ready` once the artifact has been uploaded, and back to `None` when saves are
//! cleared. Waiters are woken by the store's change notifications rather than
//! polling.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::{
    error::ServiceError,
    state::{
        AppState,
        model::{FileState, GameSwapInstance, SaveVersion},
        store::unix_millis,
    },
};

/// Why a readiness wait gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileWaitError {
    #[error("save for instance `{instance_id}` not ready within {timeout:?}")]
    Timeout {
        instance_id: String,
        timeout: Duration,
    },
    #[error("unknown instance `{0}`")]
    UnknownInstance(String),
}

/// Set an instance's file state; `pending_player` records who moves the save.
pub async fn set_instance_file_state(
    state: &AppState,
    instance_id: &str,
    file_state: FileState,
    pending_player: &str,
) -> Result<(), ServiceError> {
    state
        .store()
        .try_update(|session| {
            let instance = session.instance_mut(instance_id).ok_or_else(|| {
                ServiceError::NotFound(format!("instance `{instance_id}` not found"))
            })?;
            instance.file_state = file_state;
            instance.pending_player = match file_state {
                FileState::Pending => pending_player.to_string(),
                _ => String::new(),
            };
            Ok::<(), ServiceError>(())
        })
        .await?;
    debug!(instance = %instance_id, state = ?file_state, "instance file state changed");
    Ok(())
}

/// Mark several instances as being handed off, in one mutation.
///
/// Each entry pairs an instance id with the player moving its save. Unknown ids
/// are skipped.
pub async fn mark_pending(state: &AppState, handoffs: &[(String, String)]) {
    if handoffs.is_empty() {
        return;
    }
    state
        .store()
        .update(|session| {
            for (instance_id, player) in handoffs {
                if let Some(instance) = session.instance_mut(instance_id) {
                    instance.file_state = FileState::Pending;
                    instance.pending_player = player.clone();
                }
            }
        })
        .await;
}

/// Record a freshly stored artifact and flip the instance to `Ready`.
pub async fn record_upload(
    state: &AppState,
    instance_id: &str,
    size: u64,
    hash: Option<String>,
) -> Result<GameSwapInstance, ServiceError> {
    state
        .store()
        .try_update(|session| {
            let instance = session.instance_mut(instance_id).ok_or_else(|| {
                ServiceError::NotFound(format!("instance `{instance_id}` not found"))
            })?;
            let piece_len = instance.save.piece_len;
            instance.save = SaveVersion {
                hash: hash.unwrap_or_default(),
                size,
                updated_at: unix_millis(),
                piece_len,
            };
            instance.file_state = FileState::Ready;
            instance.pending_player.clear();
            Ok(instance.clone())
        })
        .await
}

/// Reconcile an instance's readiness with the disk, unless a hand-off is in flight.
///
/// The existence check happens outside the store lock.
pub async fn refresh_from_disk(state: &AppState, instance_id: &str) -> Option<FileState> {
    let on_disk = if state.saves().exists(instance_id) {
        FileState::Ready
    } else {
        FileState::None
    };

    let current = state
        .store()
        .read(|session| session.instance(instance_id).map(|i| i.file_state))
        .await?;
    if current == on_disk || current == FileState::Pending {
        return Some(current);
    }

    state
        .store()
        .update(|session| {
            let instance = session.instance_mut(instance_id)?;
            if instance.file_state != FileState::Pending {
                instance.file_state = on_disk;
            }
            Some(instance.file_state)
        })
        .await
}

/// Wait until `instance_id` is `Ready`, giving up after `timeout`.
///
/// Returns immediately when it already is. Does not change the file state.
pub async fn wait_for_file_ready(
    state: &AppState,
    instance_id: &str,
    timeout: Duration,
) -> Result<GameSwapInstance, FileWaitError> {
    let deadline = Instant::now() + timeout;
    // Subscribe before the first check so a change in between still wakes us.
    let mut changes = state.store().subscribe();

    loop {
        let instance = state
            .store()
            .read(|session| session.instance(instance_id).cloned())
            .await
            .ok_or_else(|| FileWaitError::UnknownInstance(instance_id.to_string()))?;
        if instance.file_state == FileState::Ready {
            return Ok(instance);
        }

        let timed_out = || FileWaitError::Timeout {
            instance_id: instance_id.to_string(),
            timeout,
        };
        match timeout_at(deadline, changes.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) | Err(_) => return Err(timed_out()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            SharedState,
            model::{GameSwapInstance, SessionState},
        },
    };

    fn state_with_instance(saves_dir: &std::path::Path) -> SharedState {
        let config = AppConfig {
            saves_dir: saves_dir.to_path_buf(),
            ..AppConfig::default()
        };
        let session = SessionState {
            instances: vec![GameSwapInstance::new("i1", "x.nes")],
            ..SessionState::default()
        };
        AppState::new(config, session)
    }

    #[tokio::test]
    async fn wait_returns_promptly_once_ready() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_instance(dir.path());

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move {
                wait_for_file_ready(&state, "i1", Duration::from_secs(5)).await
            })
        };
        tokio::task::yield_now().await;

        set_instance_file_state(&state, "i1", FileState::Pending, "alice")
            .await
            .unwrap();
        record_upload(&state, "i1", 12, Some("abc".into()))
            .await
            .unwrap();

        let ready = waiter.await.unwrap().unwrap();
        assert_eq!(ready.file_state, FileState::Ready);
        assert_eq!(ready.save.size, 12);
        assert_eq!(ready.save.hash, "abc");
        assert!(ready.pending_player.is_empty());
    }

    #[tokio::test]
    async fn wait_times_out_without_touching_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_instance(dir.path());
        set_instance_file_state(&state, "i1", FileState::Pending, "alice")
            .await
            .unwrap();

        let err = wait_for_file_ready(&state, "i1", Duration::from_millis(30))
            .await
            .unwrap_err();

        assert!(matches!(err, FileWaitError::Timeout { .. }));
        let instance = state
            .store()
            .read(|s| s.instance("i1").cloned())
            .await
            .unwrap();
        assert_eq!(instance.file_state, FileState::Pending);
        assert_eq!(instance.pending_player, "alice");
    }

    #[tokio::test]
    async fn unknown_instance_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_instance(dir.path());
        let err = wait_for_file_ready(&state, "nope", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, FileWaitError::UnknownInstance("nope".into()));
        let err = set_instance_file_state(&state, "nope", FileState::Ready, "")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn refresh_reads_disk_but_keeps_pending() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_instance(dir.path());

        assert_eq!(refresh_from_disk(&state, "i1").await, Some(FileState::None));

        state.saves().write("i1", b"data").await.unwrap();
        assert_eq!(refresh_from_disk(&state, "i1").await, Some(FileState::Ready));

        mark_pending(&state, &[("i1".to_string(), "bob".to_string())]).await;
        assert_eq!(
            refresh_from_disk(&state, "i1").await,
            Some(FileState::Pending)
        );
        assert_eq!(refresh_from_disk(&state, "missing").await, None);
    }
}
