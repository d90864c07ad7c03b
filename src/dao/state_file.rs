//! On-disk JSON snapshot of the session state.
//!
//! Writes go to a sibling temporary file which is flushed and then renamed over
//! the canonical path, so readers never observe a partially written file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{fs, io::AsyncWriteExt, time::sleep};
use tracing::{debug, warn};

use crate::{
    dao::storage::{StorageError, StorageResult},
    state::model::SessionState,
};

const RENAME_BACKOFF: Duration = Duration::from_millis(50);

/// Read and decode the state file, returning `None` when it does not exist yet.
pub async fn load(path: &Path) -> StorageResult<Option<SessionState>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StorageError::io(path, err)),
    };

    serde_json::from_slice::<SessionState>(&bytes)
        .map(Some)
        .map_err(|source| StorageError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize `state` and atomically replace the file at `path`.
///
/// The final rename is retried up to `rename_attempts` times with a growing
/// backoff, since external tools (backup agents, antivirus) may briefly hold a
/// lock on the destination.
pub async fn write_atomic(
    path: &Path,
    state: &SessionState,
    rename_attempts: u32,
) -> StorageResult<()> {
    let json = serde_json::to_vec_pretty(state).map_err(StorageError::Encode)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| StorageError::io(parent, err))?;
    }

    let tmp_path = temporary_path(path);
    write_and_flush(&tmp_path, &json).await?;

    let attempts = rename_attempts.max(1);
    let mut attempt = 1;
    loop {
        match fs::rename(&tmp_path, path).await {
            Ok(()) => {
                debug!(path = %path.display(), bytes = json.len(), "state file written");
                return Ok(());
            }
            Err(err) if attempt < attempts => {
                warn!(
                    path = %path.display(),
                    attempt,
                    error = %err,
                    "state file rename failed; retrying"
                );
                sleep(RENAME_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::io(path, err));
            }
        }
    }
}

async fn write_and_flush(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|err| StorageError::io(path, err))?;
    file.write_all(bytes)
        .await
        .map_err(|err| StorageError::io(path, err))?;
    file.sync_all()
        .await
        .map_err(|err| StorageError::io(path, err))?;
    Ok(())
}

/// Temporary sibling of `path`; same directory so the rename stays on one filesystem.
fn temporary_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.json".into());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::{GameMode, GameSwapInstance, Player};

    fn sample_state() -> SessionState {
        let mut state = SessionState {
            running: true,
            swap_enabled: true,
            mode: GameMode::Save,
            min_interval_secs: 30,
            max_interval_secs: 90,
            games: vec!["a.nes".into(), "b.nes".into()],
            instances: vec![GameSwapInstance::new("i1", "a.nes")],
            updated_at: 42,
            ..SessionState::default()
        };
        let mut player = Player::new("alice");
        player.connected = true;
        player.game = "a.nes".into();
        player.instance_id = "i1".into();
        state.players.insert("alice".into(), player);
        state
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(&dir.path().join("state.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn write_then_load_returns_same_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let state = sample_state();

        write_atomic(&path, &state, 3).await.unwrap();
        let loaded = load(&path).await.unwrap().expect("state written");

        assert_eq!(loaded, state);
        assert!(!temporary_path(&path).exists());
    }

    #[tokio::test]
    async fn written_file_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_atomic(&path, &sample_state(), 1).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"running\": true"));
    }

    #[tokio::test]
    async fn unknown_fields_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"running":false,"legacy":true}"#).unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Decode { .. }));
    }
}
