//! Access to the `multimodal_data` table.
//!
//! The rest of the hospital schema is plain CRUD and lives elsewhere; this
//! repository covers only what the asset service needs: insert, point lookup,
//! filtered list and delete-by-id.

mod sea_orm_repo;

use async_trait::async_trait;
use sea_orm::DbErr;

use crate::entity::multimodal_data;

pub use sea_orm_repo::SeaOrmAssetRepository;

/// A persisted asset row.
pub type Asset = multimodal_data::Model;

/// Column values for a row about to be inserted. `created_at` is assigned by
/// the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub id: String,
    pub patient_id: Option<String>,
    pub record_id: Option<String>,
    pub source_table: String,
    pub source_pk: Option<String>,
    pub modality: String,
    pub text_content: Option<String>,
    pub file_path: Option<String>,
    pub file_format: Option<String>,
    pub description: Option<String>,
}

/// Equality filters for listing. `None` means no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetFilter {
    pub modality: Option<String>,
    pub patient_id: Option<String>,
}

impl AssetFilter {
    pub fn matches(&self, asset: &Asset) -> bool {
        self.modality.as_ref().is_none_or(|m| *m == asset.modality)
            && self
                .patient_id
                .as_ref()
                .is_none_or(|p| asset.patient_id.as_ref() == Some(p))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("asset '{0}' already exists")]
    Duplicate(String),

    #[error("database error: {0}")]
    Backend(#[from] DbErr),
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Insert a new row. A duplicate id yields [`RepositoryError::Duplicate`]
    /// and leaves the existing row untouched.
    async fn insert(&self, asset: NewAsset) -> Result<Asset, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Asset>, RepositoryError>;

    /// Rows matching `filter`, in whatever order the backend returns them.
    async fn list(&self, filter: &AssetFilter) -> Result<Vec<Asset>, RepositoryError>;

    /// Delete by id, returning the number of rows removed.
    async fn delete_by_id(&self, id: &str) -> Result<u64, RepositoryError>;
}
