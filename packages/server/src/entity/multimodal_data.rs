use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "multimodal_data")]
pub struct Model {
    /// Caller-supplied primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Loose references; integrity is not enforced.
    pub patient_id: Option<String>,
    pub record_id: Option<String>,

    /// Provenance tag, `"Upload"` for direct uploads.
    pub source_table: String,
    pub source_pk: Option<String>,

    /// Modality exactly as the client sent it.
    pub modality: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub text_content: Option<String>,

    /// Path relative to the storage root. Older rows may hold absolute paths.
    pub file_path: Option<String>,

    pub file_format: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
