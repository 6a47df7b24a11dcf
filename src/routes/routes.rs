//! Defines routes for all asset operations.
//!
//! ## Structure
//! - **Upload & transforms**
//!   - `POST   /upload/`               — create an image or PDF from base64
//!   - `POST   /rotate/`               — rotate a stored image
//!   - `POST   /convert_pdf_to_image/` — rasterize every page of a PDF
//!   - `POST   /file_to_base64/`       — read a file under the export root
//!
//! - **Images**
//!   - `GET    /images/`               — list
//!   - `GET    /images/{id}/`          — detail
//!   - `DELETE /images/delete/{id}`    — delete record and blob
//!
//! - **PDFs**
//!   - `GET    /pdfs/`
//!   - `GET    /pdfs/{id}/`
//!   - `DELETE /pdfs/delete/{id}`
//!
//! Anything else answers 404 (unknown path) or 405 (wrong method) with the
//! usual error payload.

use crate::{
    handlers::{
        asset_handlers::{
            convert_pdf_to_image, delete_image, delete_pdf, file_to_base64, get_image, get_pdf,
            list_images, list_pdfs, method_not_allowed, rotate_image, route_not_found,
            upload_file,
        },
        health_handlers::{healthz, readyz},
    },
    services::asset_service::AssetService,
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build and return the router for all asset routes.
///
/// The router carries shared state (`AssetService`) to all handlers.
pub fn routes() -> Router<AssetService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Upload & transforms
        .route("/upload/", post(upload_file))
        .route("/file_to_base64/", post(file_to_base64))
        .route("/rotate/", post(rotate_image))
        .route("/convert_pdf_to_image/", post(convert_pdf_to_image))
        // Images
        .route("/images/", get(list_images))
        .route("/images/{id}/", get(get_image))
        .route("/images/delete/{id}", delete(delete_image))
        // PDFs
        .route("/pdfs/", get(list_pdfs))
        .route("/pdfs/{id}/", get(get_pdf))
        .route("/pdfs/delete/{id}", delete(delete_pdf))
        // Unmatched requests still get an `{"error": ...}` body
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
}
