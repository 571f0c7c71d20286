//! Filesystem blob store.

use super::{is_valid_blob_id, BlobStorage, StoredBlob};
use crate::error::StorageError;
use async_trait::async_trait;
use rand::RngCore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Stores each blob as one file named by its id.
///
/// Writes go to a temporary file in the same directory, are fsynced, then
/// renamed into place, so a reader never sees a partial blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory holding the blobs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_atomically(&self, id: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = self.dir.join(format!(".{id}.tmp"));
        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, self.dir.join(id)).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for FsBlobStore {
    async fn store(&self, bytes: &[u8]) -> Result<StoredBlob, StorageError> {
        let id = random_id();
        self.write_atomically(&id, bytes).await?;
        tracing::debug!(id = %id, size = bytes.len(), "Stored blob");
        Ok(StoredBlob {
            id,
            size: bytes.len() as u64,
        })
    }

    async fn open(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        if !is_valid_blob_id(id) {
            return Err(StorageError::InvalidId { id: id.to_string() });
        }
        match tokio::fs::read(self.dir.join(id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (FsBlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().join("uploads")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn store_and_open() {
        let (store, _dir) = store().await;
        let blob = store.store(b"hello blob").await.unwrap();
        assert!(is_valid_blob_id(&blob.id));
        assert_eq!(blob.size, 10);
        assert_eq!(store.open(&blob.id).await.unwrap(), b"hello blob");
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let (store, _dir) = store().await;
        let a = store.store(b"x").await.unwrap();
        let b = store.store(b"x").await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn no_temporary_files_remain() {
        let (store, _dir) = store().await;
        let blob = store.store(b"payload").await.unwrap();
        let names: Vec<String> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![blob.id]);
    }

    #[tokio::test]
    async fn unknown_and_invalid_ids() {
        let (store, _dir) = store().await;
        assert!(matches!(
            store.open(&"0".repeat(32)).await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            store.open("../secret").await,
            Err(StorageError::InvalidId { .. })
        ));
    }
}
