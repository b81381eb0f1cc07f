use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn api_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::health::index))
        .routes(routes!(handlers::health::health))
        .nest("/assets", asset_routes(config))
}

fn asset_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::asset::list_assets,
            handlers::asset::create_asset
        ))
        .routes(routes!(handlers::asset::delete_asset))
        .routes(routes!(handlers::asset::download_asset_file))
        .layer(handlers::asset::upload_body_limit(
            config.storage.max_blob_size,
        ))
}
