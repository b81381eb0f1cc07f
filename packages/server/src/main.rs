use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common::storage::{BlobStore, FilesystemBlobStore};
use tracing::info;

use meddata_server::config::AppConfig;
use meddata_server::repository::SeaOrmAssetRepository;
use meddata_server::service::AssetService;
use meddata_server::state::AppState;
use meddata_server::{build_router, database, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_tracing(&config.logging).context("Failed to initialize logging")?;

    let db = database::init_db(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;

    let blobs = FilesystemBlobStore::new(config.storage.clone())
        .await
        .with_context(|| {
            format!(
                "Failed to prepare storage root {}",
                config.storage.root.display()
            )
        })?;
    info!("Storing files under {}", blobs.root().display());

    let assets = AssetService::new(
        Arc::new(SeaOrmAssetRepository::new(db.clone())),
        Arc::new(blobs),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host/server.port")?;

    let state = AppState {
        db,
        config: Arc::new(config),
        assets,
    };
    let app = build_router(state);

    info!("MedData Hub listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
