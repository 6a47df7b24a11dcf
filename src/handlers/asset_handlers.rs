//! HTTP handlers for image and PDF assets.
//!
//! Handlers validate request fields and decode the transport encoding;
//! everything else is delegated to `AssetService`.

use crate::{
    errors::AppError,
    models::{document::DocumentView, image::ImageView},
    services::asset_service::{AssetKind, AssetService, UploadedAsset},
};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// Body of `POST /upload/`.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Base64-encoded file contents.
    pub file: Option<String>,
    /// `image` or `pdf`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Body of `POST /rotate/`.
#[derive(Debug, Deserialize)]
pub struct RotateRequest {
    pub image_id: Option<i64>,
    /// Degrees, counter-clockwise. `0` is a valid angle.
    pub angle: Option<i64>,
}

/// Body of `POST /convert_pdf_to_image/`.
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub pdf_id: Option<i64>,
}

/// Body of `POST /file_to_base64/`.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub file_path: String,
    pub base64: String,
}

/// `POST /upload/` — create an image or PDF from base64 bytes.
pub async fn upload_file(
    State(service): State<AssetService>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload?;

    let data = req
        .file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::validation("File data is required"))?;
    let tag = req
        .kind
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::validation("File type is required (image or pdf)"))?;
    let kind = AssetKind::parse(&tag)
        .ok_or_else(|| AppError::validation("Invalid file type. Supported types: image, pdf"))?;

    // wrapped (MIME-style) base64 is accepted
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact)
        .map_err(|_| AppError::validation("Invalid base64 file data"))?;

    let response = match service.upload(kind, bytes).await? {
        UploadedAsset::Image(image) => (
            StatusCode::CREATED,
            Json(ImageView::new(image, service.media_url())),
        )
            .into_response(),
        UploadedAsset::Document(document) => (
            StatusCode::CREATED,
            Json(DocumentView::new(document, service.media_url())),
        )
            .into_response(),
    };
    Ok(response)
}

/// `GET /images/`
pub async fn list_images(
    State(service): State<AssetService>,
) -> Result<Json<Vec<ImageView>>, AppError> {
    let images = service.list_images().await?;
    Ok(Json(
        images
            .into_iter()
            .map(|image| ImageView::new(image, service.media_url()))
            .collect(),
    ))
}

/// `GET /pdfs/`
pub async fn list_pdfs(
    State(service): State<AssetService>,
) -> Result<Json<Vec<DocumentView>>, AppError> {
    let documents = service.list_documents().await?;
    Ok(Json(
        documents
            .into_iter()
            .map(|document| DocumentView::new(document, service.media_url()))
            .collect(),
    ))
}

/// `GET /images/{id}/`
pub async fn get_image(
    State(service): State<AssetService>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ImageView>, AppError> {
    let Path(id) = id?;
    let image = service.get_image(id).await?;
    Ok(Json(ImageView::new(image, service.media_url())))
}

/// `GET /pdfs/{id}/`
pub async fn get_pdf(
    State(service): State<AssetService>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DocumentView>, AppError> {
    let Path(id) = id?;
    let document = service.get_document(id).await?;
    Ok(Json(DocumentView::new(document, service.media_url())))
}

/// `DELETE /images/delete/{id}`
pub async fn delete_image(
    State(service): State<AssetService>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    service.delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /pdfs/delete/{id}`
pub async fn delete_pdf(
    State(service): State<AssetService>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    service.delete_document(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /rotate/` — rotate a stored image in place.
pub async fn rotate_image(
    State(service): State<AssetService>,
    payload: Result<Json<RotateRequest>, JsonRejection>,
) -> Result<Json<ImageView>, AppError> {
    let Json(req) = payload?;
    let id = req
        .image_id
        .ok_or_else(|| AppError::validation("Image ID is required"))?;
    let angle = req
        .angle
        .ok_or_else(|| AppError::validation("Rotation angle is required"))?;

    let image = service.rotate_image(id, angle).await?;
    Ok(Json(ImageView::new(image, service.media_url())))
}

/// `POST /convert_pdf_to_image/` — rasterize every page of a PDF.
pub async fn convert_pdf_to_image(
    State(service): State<AssetService>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<Vec<ImageView>>, AppError> {
    let Json(req) = payload?;
    let id = req
        .pdf_id
        .ok_or_else(|| AppError::validation("PDF ID is required"))?;

    let images = service.rasterize_document(id).await?;
    Ok(Json(
        images
            .into_iter()
            .map(|image| ImageView::new(image, service.media_url()))
            .collect(),
    ))
}

/// `POST /file_to_base64/` — read a file under the export root as base64.
pub async fn file_to_base64(
    State(service): State<AssetService>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Json<ExportResponse>, AppError> {
    let Json(req) = payload?;
    let path = req
        .file_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("File path is required"))?;

    let exported = service.export_base64(&path).await?;
    Ok(Json(ExportResponse {
        file_path: exported.path.display().to_string(),
        base64: exported.base64,
    }))
}

/// Fallback for paths no route matches.
pub async fn route_not_found() -> AppError {
    AppError::not_found("Not found")
}

/// Fallback for known paths requested with an unsupported method.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("Method not allowed".into())
}
