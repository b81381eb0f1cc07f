use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Where a blob ended up after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Path relative to the storage root, always `/`-separated.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
}

/// A blob opened for streaming.
pub struct OpenedBlob {
    pub path: PathBuf,
    pub size: u64,
    pub reader: BoxReader,
}

/// What happened when a blob removal was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    AlreadyAbsent,
    /// Removal failed and the failure was logged, not propagated.
    Failed(String),
}

/// Blob storage organized into per-modality buckets under a single root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Canonical storage root.
    fn root(&self) -> &Path;

    /// Store bytes at a bucket-relative path.
    async fn put(&self, bucket_relative: &str, data: &[u8]) -> Result<StoredBlob, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(bucket_relative, reader).await
    }

    /// Stream data to a bucket-relative path.
    ///
    /// Never overwrites an existing file: on collision a suffixed name is used
    /// and reported back in [`StoredBlob::relative_path`].
    async fn put_stream(
        &self,
        bucket_relative: &str,
        reader: BoxReader,
    ) -> Result<StoredBlob, StorageError>;

    /// Lexically map a stored path onto a normalized root-relative path.
    ///
    /// Does not touch the filesystem, so the target need not exist. Paths that
    /// leave the root fail with [`StorageError::PathViolation`].
    fn relative_path(&self, stored: &str) -> Result<PathBuf, StorageError>;

    /// Resolve a stored path (root-relative or absolute) to an existing file
    /// inside the root.
    async fn resolve(&self, stored: &str) -> Result<PathBuf, StorageError>;

    /// Resolve a stored path and open it for streaming.
    async fn open(&self, stored: &str) -> Result<OpenedBlob, StorageError>;

    /// Retrieve all bytes of a stored blob.
    async fn get(&self, stored: &str) -> Result<Vec<u8>, StorageError> {
        let mut blob = self.open(stored).await?;
        let mut buf = Vec::new();
        blob.reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Check whether a stored path resolves to an existing file.
    async fn exists(&self, stored: &str) -> Result<bool, StorageError> {
        match self.resolve(stored).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Best-effort removal of a resolved path. Never fails.
    async fn remove(&self, absolute: &Path) -> RemovalOutcome;
}
