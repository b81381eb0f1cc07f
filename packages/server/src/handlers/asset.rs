use std::path::PathBuf;

use axum::Json;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::extractors::query::AppQuery;
use crate::models::asset::*;
use crate::service::{CreatedAsset, UploadedFile};
use crate::state::AppState;

/// Multipart framing and metadata fields on top of the blob itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

pub fn upload_body_limit(max_blob_size: u64) -> DefaultBodyLimit {
    let limit = max_blob_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Assets",
    operation_id = "listAssets",
    summary = "List multimodal assets",
    description = "Returns all assets matching the optional `modality` and `patientId` filters \
        (exact match, no pagination). Order is unspecified.",
    params(AssetListQuery),
    responses(
        (status = 200, description = "Matching assets", body = Vec<AssetResponse>),
        (status = 400, description = "Invalid query (VALIDATION_ERROR)", body = ErrorBody),
        (status = 500, description = "Database fault (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query), fields(modality = ?query.modality, patient_id = ?query.patient_id))]
pub async fn list_assets(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<AssetListQuery>,
) -> Result<Json<Vec<AssetResponse>>, AppError> {
    let assets = state.assets.list(query.into()).await?;
    Ok(Json(assets.into_iter().map(AssetResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Assets",
    operation_id = "createAsset",
    summary = "Create an asset",
    description = "Creates an asset row, optionally with a file. Send `multipart/form-data` with \
        camelCase text fields and an optional `file` part to upload, or `application/json` to \
        create a metadata-only asset. A JSON `filePath` is stored as given without checking that \
        the file exists.",
    request_body(
        description = "Asset metadata, with an optional `file` part when multipart",
        content(
            (CreateAssetRequest = "application/json"),
            (CreateAssetRequest = "multipart/form-data"),
        ),
    ),
    responses(
        (status = 201, description = "Asset created", body = CreateAssetResponse),
        (status = 400, description = "Missing id/modality, bad filename or oversize upload (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Id already exists (CONFLICT)", body = ErrorBody),
        (status = 500, description = "Storage or database fault (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, request))]
pub async fn create_asset(
    State(state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"));

    let created = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        create_from_multipart(&state, multipart).await?
    } else {
        let AppJson(payload) = AppJson::<CreateAssetRequest>::from_request(request, &state).await?;
        state.assets.create(payload.into(), None).await?
    };

    Ok((StatusCode::CREATED, Json(CreateAssetResponse::from(created))))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Assets",
    operation_id = "deleteAsset",
    summary = "Delete an asset",
    description = "Deletes the asset row, then makes a best-effort attempt to remove its file. \
        Success means the row is gone; `fileRemoval` reports what happened to the file.",
    params(("id" = String, Path, description = "Asset id")),
    responses(
        (status = 200, description = "Asset deleted", body = DeleteAssetResponse),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Database fault (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteAssetResponse>, AppError> {
    let deleted = state.assets.delete(&id).await?;
    Ok(Json(DeleteAssetResponse::from(deleted)))
}

#[utoipa::path(
    get,
    path = "/{id}/file",
    tag = "Assets",
    operation_id = "downloadAssetFile",
    summary = "Download an asset's file",
    description = "Streams the file behind an asset with a content type inferred from its format.",
    params(("id" = String, Path, description = "Asset id")),
    responses(
        (status = 200, description = "File content"),
        (status = 400, description = "Stored path escapes the storage root (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Unknown asset, no file, or file missing on disk (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn download_asset_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let blob = state.assets.fetch(&id).await?;
    let body = Body::from_stream(ReaderStream::new(blob.reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, blob.content_type)
        .header(header::CONTENT_LENGTH, blob.size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&blob.file_name),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Collect metadata fields and spool the `file` part, then hand both to the
/// service. The spool file is removed whatever the outcome.
async fn create_from_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<CreatedAsset, AppError> {
    let max_size = state.config.storage.max_blob_size;
    let mut fields = CreateAssetRequest::default();
    let mut spooled: Option<SpooledUpload> = None;

    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let has_name = field.file_name().is_some_and(|n| !n.trim().is_empty());
                if !has_name {
                    debug!("Ignoring 'file' part without a filename");
                    continue;
                }
                if spooled.is_some() {
                    return Err(AppError::Validation(
                        "Only one 'file' part is allowed".into(),
                    ));
                }
                spooled = Some(spool_field(field, max_size).await?);
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read '{name}': {e}")))?;
            if !fields.set_field(&name, value) {
                debug!(field = %name, "Ignoring unknown multipart field");
            }
        }

        let upload = match &spooled {
            Some(s) => Some(s.open().await?),
            None => None,
        };
        Ok(state.assets.create(fields.into(), upload).await?)
    }
    .await;

    if let Some(s) = spooled {
        s.discard().await;
    }

    result
}

/// An uploaded file part buffered to a temp file.
struct SpooledUpload {
    path: PathBuf,
    file_name: Option<String>,
}

impl SpooledUpload {
    async fn open(&self) -> Result<UploadedFile, AppError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {e}")))?;
        Ok(UploadedFile {
            file_name: self.file_name.clone(),
            reader: Box::new(file),
        })
    }

    async fn discard(self) {
        // Best effort.
        let _ = tokio::fs::remove_file(&self.path).await;
    }
}

/// Stream a multipart field to a temp file, enforcing `max_size`.
async fn spool_field(
    mut field: axum::extract::multipart::Field<'_>,
    max_size: u64,
) -> Result<SpooledUpload, AppError> {
    let file_name = field.file_name().map(|s| s.to_string());
    let temp_path = std::env::temp_dir().join(format!("meddata-upload-{}", Uuid::new_v4()));

    let result = async {
        let mut temp_file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

        let mut total_size: u64 = 0;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
        {
            total_size += chunk.len() as u64;
            if total_size > max_size {
                return Err(AppError::Validation(format!(
                    "File exceeds maximum size of {max_size} bytes"
                )));
            }
            temp_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
        }

        temp_file
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => Ok(SpooledUpload {
            path: temp_path,
            file_name,
        }),
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

/// `Content-Disposition: inline` with an ASCII fallback and an RFC 5987
/// `filename*` carrying the exact name.
fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                String::from(b as char)
            }
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("inline; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
