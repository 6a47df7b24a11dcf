use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::asset_service::AssetError;

/// Errors surfaced to HTTP clients.
///
/// Every variant carries the human-readable message that ends up in the
/// `{"error": ...}` payload.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    Validation(String),

    /// No record exists for the requested id.
    #[error("{0}")]
    NotFound(String),

    /// The path exists but not for this HTTP method.
    #[error("{0}")]
    MethodNotAllowed(String),

    /// The bytes do not parse as the declared kind.
    #[error("{0}")]
    InvalidFormat(String),

    /// Store, codec or filesystem failure.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(json!({ "error": self.to_string() }));

        (status, body).into_response()
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::ImageNotFound(_) => AppError::not_found("Image not found"),
            AssetError::DocumentNotFound(_) => AppError::not_found("PDF not found"),
            AssetError::InvalidImage(_) => AppError::InvalidFormat("Invalid image file".into()),
            AssetError::InvalidDocument(_) => AppError::InvalidFormat("Invalid PDF file".into()),
            AssetError::InvalidPath(_) => AppError::validation("Invalid file path"),
            AssetError::FileNotFound(_) => AppError::validation("File not found"),
            other => AppError::internal(format!("An error occurred: {}", other)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn payload_only_carries_error_message() {
        let (status, body) = body_json(AppError::validation("PDF ID is required")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "PDF ID is required" }));
    }

    #[tokio::test]
    async fn asset_errors_map_to_taxonomy() {
        let (status, body) = body_json(AssetError::DocumentNotFound(999).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "PDF not found");

        let (status, body) = body_json(AssetError::InvalidImage("garbage".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid image file");

        let (status, body) = body_json(AssetError::Task("worker panicked".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "An error occurred: worker panicked");
    }
}
