use chrono::{DateTime, Utc};
use common::storage::RemovalOutcome;
use serde::{Deserialize, Serialize};

use crate::repository::{Asset, AssetFilter};
use crate::service::{CreateAsset, CreatedAsset, DeletedAsset};

/// Bytes left unescaped in a path segment (RFC 3986 unreserved set).
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// URL of the file-fetch endpoint for an asset id.
pub fn file_url(id: &str) -> String {
    let encoded: String = id
        .bytes()
        .map(|b| {
            if is_unreserved(b) {
                String::from(b as char)
            } else {
                format!("%{b:02X}")
            }
        })
        .collect();
    format!("/assets/{encoded}/file")
}

fn file_url_for(id: &str, file_path: Option<&str>) -> Option<String> {
    file_path.filter(|p| !p.is_empty()).map(|_| file_url(id))
}

/// A multimodal asset as returned by the list endpoint.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    #[schema(example = "MM001")]
    pub id: String,
    #[schema(example = "P001")]
    pub patient_id: Option<String>,
    #[schema(example = "R001")]
    pub record_id: Option<String>,
    #[schema(example = "Upload")]
    pub source_table: String,
    #[schema(example = "MM001")]
    pub source_pk: Option<String>,
    /// Modality tag as supplied at creation.
    #[schema(example = "image")]
    pub modality: String,
    pub text_content: Option<String>,
    /// Path of the blob relative to the storage root.
    #[schema(example = "image/chest_xray.png")]
    pub file_path: Option<String>,
    #[schema(example = "png")]
    pub file_format: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Fetch endpoint for the blob, present when `filePath` is set.
    #[schema(example = "/assets/MM001/file")]
    pub file_url: Option<String>,
}

impl From<Asset> for AssetResponse {
    fn from(model: Asset) -> Self {
        Self {
            file_url: file_url_for(&model.id, model.file_path.as_deref()),
            id: model.id,
            patient_id: model.patient_id,
            record_id: model.record_id,
            source_table: model.source_table,
            source_pk: model.source_pk,
            modality: model.modality,
            text_content: model.text_content,
            file_path: model.file_path,
            file_format: model.file_format,
            description: model.description,
            created_at: Some(model.created_at),
        }
    }
}

/// Query parameters for asset listing. Empty values are ignored.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AssetListQuery {
    /// Filter by modality tag (exact match).
    #[param(example = "image")]
    pub modality: Option<String>,
    /// Filter by patient id (exact match).
    #[param(example = "P001")]
    pub patient_id: Option<String>,
}

impl From<AssetListQuery> for AssetFilter {
    fn from(query: AssetListQuery) -> Self {
        Self {
            modality: query.modality,
            patient_id: query.patient_id,
        }
    }
}

/// JSON body for creating an asset without uploading a file.
///
/// The same fields are accepted as multipart text parts alongside an optional
/// `file` part.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetRequest {
    #[schema(example = "MM001")]
    pub id: Option<String>,
    #[schema(example = "P001")]
    pub patient_id: Option<String>,
    pub record_id: Option<String>,
    /// Provenance table; defaults to `Upload`.
    pub source_table: Option<String>,
    /// Provenance key; defaults to the asset id.
    pub source_pk: Option<String>,
    #[schema(example = "image")]
    pub modality: Option<String>,
    pub text_content: Option<String>,
    /// Reference to a file under the storage root. Must stay inside the root;
    /// the file itself need not exist yet.
    #[schema(example = "other/x.bin")]
    pub file_path: Option<String>,
    #[schema(example = "bin")]
    pub file_format: Option<String>,
    pub description: Option<String>,
}

impl CreateAssetRequest {
    /// Assign a multipart text field by its camelCase name. Returns `false`
    /// for unknown names.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "id" => &mut self.id,
            "patientId" => &mut self.patient_id,
            "recordId" => &mut self.record_id,
            "sourceTable" => &mut self.source_table,
            "sourcePk" => &mut self.source_pk,
            "modality" => &mut self.modality,
            "textContent" => &mut self.text_content,
            "filePath" => &mut self.file_path,
            "fileFormat" => &mut self.file_format,
            "description" => &mut self.description,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

impl From<CreateAssetRequest> for CreateAsset {
    fn from(req: CreateAssetRequest) -> Self {
        Self {
            id: req.id,
            patient_id: req.patient_id,
            record_id: req.record_id,
            source_table: req.source_table,
            source_pk: req.source_pk,
            modality: req.modality,
            text_content: req.text_content,
            file_path: req.file_path,
            file_format: req.file_format,
            description: req.description,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetResponse {
    #[schema(example = "MM001")]
    pub id: String,
    #[schema(example = "pdf/report.PDF")]
    pub file_path: Option<String>,
    #[schema(example = "pdf")]
    pub file_format: Option<String>,
    #[schema(example = "/assets/MM001/file")]
    pub file_url: Option<String>,
}

impl From<CreatedAsset> for CreateAssetResponse {
    fn from(created: CreatedAsset) -> Self {
        Self {
            file_url: file_url_for(&created.id, created.file_path.as_deref()),
            id: created.id,
            file_path: created.file_path,
            file_format: created.file_format,
        }
    }
}

/// What happened to the blob during a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileRemoval {
    Removed,
    AlreadyAbsent,
    /// Removal failed; the row is gone regardless.
    Failed,
}

impl From<&RemovalOutcome> for FileRemoval {
    fn from(outcome: &RemovalOutcome) -> Self {
        match outcome {
            RemovalOutcome::Removed => Self::Removed,
            RemovalOutcome::AlreadyAbsent => Self::AlreadyAbsent,
            RemovalOutcome::Failed(_) => Self::Failed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAssetResponse {
    #[schema(example = "MM001")]
    pub id: String,
    pub deleted: bool,
    /// Blob removal outcome; null when the asset had no file.
    pub file_removal: Option<FileRemoval>,
}

impl From<DeletedAsset> for DeleteAssetResponse {
    fn from(deleted: DeletedAsset) -> Self {
        Self {
            file_removal: deleted.blob.as_ref().map(FileRemoval::from),
            id: deleted.id,
            deleted: true,
        }
    }
}
