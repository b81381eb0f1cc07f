//! Lifecycle of (metadata row, blob file) pairs.
//!
//! Ordering is fixed: on create the blob is written before the row exists, on
//! delete the row is removed before the blob. A failure in between can only
//! leave an orphaned blob, never a row pointing at a blob that was never
//! written. The one exception is a reference-only create, where the caller
//! supplies `file_path` for a file we did not write. That path must still stay
//! inside the storage root, but the file need not exist yet.

use std::sync::Arc;

use common::Modality;
use common::storage::sanitize::{bucket_path, file_format, sanitize_filename};
use common::storage::{BlobStore, BoxReader, RemovalOutcome, StorageError};
use tracing::{info, instrument, warn};

use crate::repository::{Asset, AssetFilter, AssetRepository, NewAsset, RepositoryError};

/// Provenance tag recorded for assets created without one.
pub const DEFAULT_SOURCE_TABLE: &str = "Upload";

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("{0}")]
    Validation(String),

    #[error("asset '{0}' already exists")]
    Conflict(String),

    #[error("asset '{0}' not found")]
    NotFound(String),

    #[error("asset '{0}' has no associated file")]
    NoBlobAssociated(String),

    #[error("file for asset '{0}' is missing")]
    BlobMissing(String),

    #[error("path violation: {0}")]
    PathViolation(String),

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<StorageError> for AssetError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PathViolation(path) => AssetError::PathViolation(path),
            StorageError::InvalidFilename(msg) => AssetError::Validation(msg),
            e @ StorageError::SizeLimitExceeded { .. } => AssetError::Validation(e.to_string()),
            other => AssetError::Storage(other),
        }
    }
}

impl From<RepositoryError> for AssetError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate(id) => AssetError::Conflict(id),
            other => AssetError::Repository(other),
        }
    }
}

/// Metadata for a create call. Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct CreateAsset {
    pub id: Option<String>,
    pub patient_id: Option<String>,
    pub record_id: Option<String>,
    pub source_table: Option<String>,
    pub source_pk: Option<String>,
    pub modality: Option<String>,
    pub text_content: Option<String>,
    /// Reference to a pre-existing file; ignored when a payload is uploaded.
    pub file_path: Option<String>,
    pub file_format: Option<String>,
    pub description: Option<String>,
}

/// An uploaded payload.
pub struct UploadedFile {
    /// Client-supplied filename, untrusted.
    pub file_name: Option<String>,
    pub reader: BoxReader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAsset {
    pub id: String,
    pub file_path: Option<String>,
    pub file_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedAsset {
    pub id: String,
    /// Outcome of blob removal, `None` when the row had no file.
    pub blob: Option<RemovalOutcome>,
}

/// A blob ready to be streamed back to a client.
pub struct AssetBlob {
    pub size: u64,
    pub reader: BoxReader,
    pub content_type: String,
    pub file_name: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Best-effort MIME type for a stored format, falling back to the path's extension.
pub fn content_type_for(file_format: Option<&str>, path: &str) -> String {
    let by_format = file_format
        .filter(|f| !f.is_empty())
        .and_then(|f| mime_guess::from_ext(f).first());
    by_format
        .or_else(|| mime_guess::from_path(path).first())
        .map(|m| m.to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Orchestrates the blob store and the metadata repository.
///
/// Holds no per-request state; clones share the same collaborators.
#[derive(Clone)]
pub struct AssetService {
    repository: Arc<dyn AssetRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl AssetService {
    pub fn new(repository: Arc<dyn AssetRepository>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { repository, blobs }
    }

    /// Create an asset, writing the payload (if any) before inserting the row.
    ///
    /// Without a payload, a caller-supplied `file_path`/`file_format` pair is
    /// stored verbatim. The path is checked lexically against the storage root
    /// but not for existence. If the insert fails
    /// after a blob was written, the blob is left behind as an orphan.
    #[instrument(skip(self, input, upload), fields(id = ?input.id, modality = ?input.modality))]
    pub async fn create(
        &self,
        input: CreateAsset,
        upload: Option<UploadedFile>,
    ) -> Result<CreatedAsset, AssetError> {
        let (Some(id), Some(modality)) = (non_empty(input.id), non_empty(input.modality)) else {
            return Err(AssetError::Validation(
                "id and modality are required".into(),
            ));
        };

        let source_table =
            non_empty(input.source_table).unwrap_or_else(|| DEFAULT_SOURCE_TABLE.to_string());
        let source_pk = non_empty(input.source_pk).unwrap_or_else(|| id.clone());

        if self.repository.find_by_id(&id).await?.is_some() {
            return Err(AssetError::Conflict(id));
        }

        let (file_path, file_format, written) = match upload {
            Some(upload) => {
                let raw_name = non_empty(upload.file_name).unwrap_or_else(|| id.clone());
                let format = file_format(&sanitize_filename(&raw_name)?);
                let target = bucket_path(Modality::from_tag(&modality), &raw_name)?;
                let stored = self.blobs.put_stream(&target, upload.reader).await?;
                info!(
                    path = %stored.relative_path,
                    size = stored.size,
                    "Stored blob for asset"
                );
                (Some(stored.relative_path), Some(format), true)
            }
            None => {
                let file_path = non_empty(input.file_path);
                if let Some(path) = &file_path {
                    self.blobs.relative_path(path)?;
                }
                (file_path, non_empty(input.file_format), false)
            }
        };

        let new_asset = NewAsset {
            id: id.clone(),
            patient_id: non_empty(input.patient_id),
            record_id: non_empty(input.record_id),
            source_table,
            source_pk: Some(source_pk),
            modality,
            text_content: non_empty(input.text_content),
            file_path: file_path.clone(),
            file_format: file_format.clone(),
            description: non_empty(input.description),
        };

        if let Err(e) = self.repository.insert(new_asset).await {
            if written {
                warn!(
                    id = %id,
                    path = ?file_path,
                    "Insert failed after blob write; blob left orphaned"
                );
            }
            return Err(e.into());
        }

        info!(id = %id, "Asset created");
        Ok(CreatedAsset {
            id,
            file_path,
            file_format,
        })
    }

    /// List assets by equality on modality and/or patient id.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: AssetFilter) -> Result<Vec<Asset>, AssetError> {
        let filter = AssetFilter {
            modality: non_empty(filter.modality),
            patient_id: non_empty(filter.patient_id),
        };
        let assets = self.repository.list(&filter).await?;
        info!(count = assets.len(), "Listed assets");
        Ok(assets)
    }

    /// Delete an asset. The row is removed first and is authoritative; blob
    /// removal is attempted afterwards and never fails the call.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<DeletedAsset, AssetError> {
        let asset = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AssetError::NotFound(id.to_string()))?;
        let file_path = non_empty(asset.file_path);

        if self.repository.delete_by_id(id).await? == 0 {
            warn!(id, "Asset vanished between lookup and delete");
            return Err(AssetError::NotFound(id.to_string()));
        }
        info!(id, "Asset row deleted");

        let blob = match file_path {
            Some(path) => Some(self.remove_blob(id, &path).await),
            None => None,
        };

        Ok(DeletedAsset {
            id: id.to_string(),
            blob,
        })
    }

    async fn remove_blob(&self, id: &str, stored: &str) -> RemovalOutcome {
        let outcome = match self.blobs.resolve(stored).await {
            Ok(path) => self.blobs.remove(&path).await,
            Err(StorageError::NotFound(_)) => RemovalOutcome::AlreadyAbsent,
            Err(e) => {
                warn!(id, path = stored, error = %e, "Could not resolve blob for removal");
                RemovalOutcome::Failed(e.to_string())
            }
        };
        match &outcome {
            RemovalOutcome::Removed => info!(id, path = stored, "Blob removed"),
            RemovalOutcome::AlreadyAbsent => info!(id, path = stored, "Blob already absent"),
            RemovalOutcome::Failed(reason) => {
                warn!(id, path = stored, reason = %reason, "Blob removal failed, ignoring")
            }
        }
        outcome
    }

    /// Open the blob behind an asset for streaming.
    #[instrument(skip(self))]
    pub async fn fetch(&self, id: &str) -> Result<AssetBlob, AssetError> {
        let asset = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AssetError::NotFound(id.to_string()))?;

        let stored = non_empty(asset.file_path)
            .ok_or_else(|| AssetError::NoBlobAssociated(id.to_string()))?;

        let blob = match self.blobs.open(&stored).await {
            Ok(blob) => blob,
            Err(StorageError::NotFound(_)) => {
                warn!(id, path = %stored, "Asset row references a missing blob");
                return Err(AssetError::BlobMissing(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let file_name = blob
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());

        Ok(AssetBlob {
            content_type: content_type_for(asset.file_format.as_deref(), &stored),
            file_name,
            size: blob.size,
            reader: blob.reader,
        })
    }
}
