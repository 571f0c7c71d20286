//! Blob storage for clips too large to carry inline.
//!
//! Clients upload the content over HTTP and send a clip whose
//! `upload_url` points back at the stored blob.

mod fs;

pub use fs::FsBlobStore;

use crate::error::StorageError;
use async_trait::async_trait;

/// Length of a blob id in hex characters.
pub const BLOB_ID_LEN: usize = 32;

/// A blob accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Random lowercase hex identifier.
    pub id: String,
    /// Stored length in bytes.
    pub size: u64,
}

impl StoredBlob {
    /// Relative download URL for this blob.
    pub fn url(&self) -> String {
        format!("/d/{}", self.id)
    }
}

/// Trait for blob storage backends.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Persist `bytes` under a fresh id.
    async fn store(&self, bytes: &[u8]) -> Result<StoredBlob, StorageError>;

    /// Read a blob back.
    ///
    /// Returns [`StorageError::InvalidId`] for ids that are not
    /// [`BLOB_ID_LEN`] lowercase hex characters and
    /// [`StorageError::NotFound`] for unknown ids.
    async fn open(&self, id: &str) -> Result<Vec<u8>, StorageError>;
}

/// Whether `id` has the shape of a blob id.
pub fn is_valid_blob_id(id: &str) -> bool {
    id.len() == BLOB_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
