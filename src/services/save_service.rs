//! Upload and download of per-instance save artifacts.

use tracing::info;

use crate::{
    dto::validation::is_valid_key,
    error::ServiceError,
    services::file_state::{record_upload, wait_for_file_ready},
    state::{SharedState, model::GameSwapInstance},
};

/// Store the uploaded artifact and mark the instance `Ready`.
///
/// The instance must exist before the bytes touch the disk.
pub async fn upload(
    state: &SharedState,
    instance_id: &str,
    bytes: &[u8],
    hash: Option<String>,
) -> Result<GameSwapInstance, ServiceError> {
    ensure_known_instance(state, instance_id).await?;
    let size = state.saves().write(instance_id, bytes).await?;
    let instance = record_upload(state, instance_id, size, hash).await?;
    info!(instance = %instance_id, size, "save artifact uploaded");
    Ok(instance)
}

/// Serve the artifact once it is ready, waiting up to the configured timeout.
pub async fn download(state: &SharedState, instance_id: &str) -> Result<Vec<u8>, ServiceError> {
    ensure_known_instance(state, instance_id).await?;
    wait_for_file_ready(state, instance_id, state.config().file_ready_timeout()).await?;
    state.saves().read(instance_id).await?.ok_or_else(|| {
        ServiceError::InvalidState(format!(
            "instance `{instance_id}` is marked ready but has no save on disk"
        ))
    })
}

async fn ensure_known_instance(state: &SharedState, instance_id: &str) -> Result<(), ServiceError> {
    if !is_valid_key(instance_id) {
        return Err(ServiceError::InvalidInput(format!(
            "invalid instance id `{instance_id}`"
        )));
    }
    let known = state
        .store()
        .read(|s| s.instance(instance_id).is_some())
        .await;
    if !known {
        return Err(ServiceError::NotFound(format!(
            "instance `{instance_id}` not found"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState,
            model::{FileState, SessionState},
        },
    };

    fn shared(dir: &tempfile::TempDir, file_ready_timeout_secs: u64) -> SharedState {
        let config = AppConfig {
            saves_dir: dir.path().join("saves"),
            file_ready_timeout_secs,
            ..AppConfig::default()
        };
        let session = SessionState {
            instances: vec![GameSwapInstance::new("i1", "x.nes")],
            ..SessionState::default()
        };
        AppState::new(config, session)
    }

    #[tokio::test]
    async fn upload_marks_instance_ready() {
        let dir = tempfile::tempdir().unwrap();
        let state = shared(&dir, 1);

        let instance = upload(&state, "i1", b"abcd", Some("h1".into())).await.unwrap();
        assert_eq!(instance.file_state, FileState::Ready);
        assert_eq!(instance.save.size, 4);
        assert_eq!(instance.save.hash, "h1");
        assert_eq!(download(&state, "i1").await.unwrap(), b"abcd".to_vec());
    }

    #[tokio::test]
    async fn download_waits_for_pending_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = shared(&dir, 5);

        let uploader = {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                upload(&state, "i1", b"late", None).await.unwrap();
            })
        };
        assert_eq!(download(&state, "i1").await.unwrap(), b"late".to_vec());
        uploader.await.unwrap();
    }

    #[tokio::test]
    async fn download_times_out_and_unknown_ids_fail() {
        let dir = tempfile::tempdir().unwrap();
        let state = shared(&dir, 0);

        assert!(matches!(download(&state, "i1").await, Err(ServiceError::Timeout)));
        assert!(matches!(
            upload(&state, "nope", b"x", None).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            upload(&state, "../x", b"x", None).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(!state.saves().exists("nope"));
    }
}
