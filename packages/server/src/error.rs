use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

use crate::repository::RepositoryError;
use crate::service::AssetError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `NOT_FOUND`,
    /// `CONFLICT`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "id and modality are required")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AppError::NotFound(format!("File '{path}' not found")),
            StorageError::PathViolation(path) => {
                tracing::warn!(path = %path, "Rejected path outside storage root");
                AppError::Validation(format!("Invalid file path '{path}'"))
            }
            StorageError::InvalidFilename(msg) => AppError::Validation(msg),
            e @ StorageError::SizeLimitExceeded { .. } => AppError::Validation(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::Validation(msg) => AppError::Validation(msg),
            AssetError::Conflict(id) => AppError::Conflict(format!("Asset '{id}' already exists")),
            AssetError::NotFound(id) => AppError::NotFound(format!("Asset '{id}' not found")),
            AssetError::NoBlobAssociated(id) => {
                AppError::NotFound(format!("Asset '{id}' has no associated file"))
            }
            AssetError::BlobMissing(id) => {
                AppError::NotFound(format!("File for asset '{id}' is missing"))
            }
            AssetError::PathViolation(path) => {
                tracing::warn!(path = %path, "Rejected path outside storage root");
                AppError::Validation(format!("Invalid file path '{path}'"))
            }
            AssetError::Storage(e) => AppError::from(e),
            AssetError::Repository(RepositoryError::Duplicate(id)) => {
                AppError::Conflict(format!("Asset '{id}' already exists"))
            }
            AssetError::Repository(RepositoryError::Backend(e)) => AppError::from(e),
        }
    }
}
