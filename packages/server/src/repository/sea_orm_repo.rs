use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use tracing::instrument;

use super::{Asset, AssetFilter, AssetRepository, NewAsset, RepositoryError};
use crate::entity::multimodal_data;

/// [`AssetRepository`] over a SeaORM connection.
#[derive(Clone)]
pub struct SeaOrmAssetRepository {
    db: DatabaseConnection,
}

impl SeaOrmAssetRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AssetRepository for SeaOrmAssetRepository {
    #[instrument(skip(self, asset), fields(id = %asset.id))]
    async fn insert(&self, asset: NewAsset) -> Result<Asset, RepositoryError> {
        let id = asset.id.clone();
        let model = multimodal_data::ActiveModel {
            id: Set(asset.id),
            patient_id: Set(asset.patient_id),
            record_id: Set(asset.record_id),
            source_table: Set(asset.source_table),
            source_pk: Set(asset.source_pk),
            modality: Set(asset.modality),
            text_content: Set(asset.text_content),
            file_path: Set(asset.file_path),
            file_format: Set(asset.file_format),
            description: Set(asset.description),
            created_at: Set(Utc::now()),
        };

        match model.insert(&self.db).await {
            Ok(saved) => Ok(saved),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(RepositoryError::Duplicate(id))
            }
            Err(e) => {
                // Not every driver error is classified; a row that is there
                // now still means we lost a uniqueness race.
                if self.find_by_id(&id).await.ok().flatten().is_some() {
                    return Err(RepositoryError::Duplicate(id));
                }
                Err(e.into())
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Asset>, RepositoryError> {
        Ok(multimodal_data::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await?)
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &AssetFilter) -> Result<Vec<Asset>, RepositoryError> {
        let mut select = multimodal_data::Entity::find();

        if let Some(modality) = &filter.modality {
            select = select.filter(multimodal_data::Column::Modality.eq(modality.as_str()));
        }
        if let Some(patient_id) = &filter.patient_id {
            select = select.filter(multimodal_data::Column::PatientId.eq(patient_id.as_str()));
        }

        Ok(select.all(&self.db).await?)
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: &str) -> Result<u64, RepositoryError> {
        let result = multimodal_data::Entity::delete_by_id(id.to_owned())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
