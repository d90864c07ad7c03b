use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::{
    dao::storage::{StorageError, StorageResult},
    dto::validation::is_valid_key,
};

const SAVE_EXTENSION: &str = "state";

/// Directory holding one save artifact per instance, keyed by instance id.
#[derive(Debug, Clone)]
pub struct SaveFiles {
    root: PathBuf,
}

impl SaveFiles {
    /// Artifacts live directly under `root`, created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the artifact for `instance_id`.
    pub fn path_for(&self, instance_id: &str) -> StorageResult<PathBuf> {
        if !is_valid_key(instance_id) {
            return Err(StorageError::InvalidKey(instance_id.to_string()));
        }
        Ok(self.root.join(format!("{instance_id}.{SAVE_EXTENSION}")))
    }

    /// Ground truth for an instance's file state.
    pub fn exists(&self, instance_id: &str) -> bool {
        self.path_for(instance_id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Store a new artifact, replacing any previous one atomically.
    pub async fn write(&self, instance_id: &str, bytes: &[u8]) -> StorageResult<u64> {
        let path = self.path_for(instance_id)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StorageError::io(&self.root, err))?;

        let tmp_path = path.with_extension("upload");
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|err| StorageError::io(&tmp_path, err))?;
        file.write_all(bytes)
            .await
            .map_err(|err| StorageError::io(&tmp_path, err))?;
        file.sync_all()
            .await
            .map_err(|err| StorageError::io(&tmp_path, err))?;
        drop(file);

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|err| StorageError::io(&path, err))?;
        debug!(instance = %instance_id, bytes = bytes.len(), "save artifact stored");
        Ok(bytes.len() as u64)
    }

    /// Read the artifact, `None` when it does not exist.
    pub async fn read(&self, instance_id: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(instance_id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }

    /// Delete every stored artifact, returning how many were removed.
    pub async fn clear_all(&self) -> StorageResult<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(StorageError::io(&self.root, err)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StorageError::io(&self.root, err))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == SAVE_EXTENSION) {
                fs::remove_file(&path)
                    .await
                    .map_err(|err| StorageError::io(&path, err))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let saves = SaveFiles::new(dir.path().join("saves"));

        assert!(!saves.exists("i1"));
        assert_eq!(saves.read("i1").await.unwrap(), None);

        let written = saves.write("i1", b"savedata").await.unwrap();
        assert_eq!(written, 8);
        assert!(saves.exists("i1"));
        assert_eq!(saves.read("i1").await.unwrap().as_deref(), Some(&b"savedata"[..]));

        saves.write("i2", b"other").await.unwrap();
        assert_eq!(saves.clear_all().await.unwrap(), 2);
        assert!(!saves.exists("i1"));
        assert!(!saves.exists("i2"));
    }

    #[test]
    fn path_traversal_keys_are_rejected() {
        let saves = SaveFiles::new("/tmp/saves");
        assert!(matches!(
            saves.path_for("../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(!saves.exists("../etc/passwd"));
    }
}
