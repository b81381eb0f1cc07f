use std::time::Duration;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::entity::multimodal_data;

pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.to_owned());

    // Set connection pool options
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    ensure_schema(&db).await?;

    Ok(db)
}

/// Create the `multimodal_data` table and its filter index when missing.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    let mut table = Schema::new(backend).create_table_from_entity(multimodal_data::Entity);
    table.if_not_exists();
    db.execute_raw(backend.build(&table)).await?;

    // List queries filter on modality and patient_id.
    let index = Index::create()
        .if_not_exists()
        .name("idx_multimodal_modality_patient")
        .table(multimodal_data::Entity)
        .col(multimodal_data::Column::Modality)
        .col(multimodal_data::Column::PatientId)
        .to_owned();

    match db.execute_raw(backend.build(&index)).await {
        Ok(_) => info!("Ensured index idx_multimodal_modality_patient exists"),
        Err(e) => warn!(
            "Failed to create index idx_multimodal_modality_patient: {}",
            e
        ),
    }

    Ok(())
}
