//! Represents an uploaded PDF document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::media_url_for;

/// A stored PDF.
///
/// Page dimensions are taken from the first page; the model assumes every
/// page shares that size.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Document {
    pub id: i64,

    /// Blob key relative to the media root (e.g. `pdfs/<uuid>.pdf`).
    pub file: String,

    pub num_pages: Option<i64>,

    /// First-page width in PDF points.
    pub page_width: Option<f64>,

    /// First-page height in PDF points.
    pub page_height: Option<f64>,

    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewDocument {
    pub file: String,
    pub num_pages: i64,
    pub page_width: f64,
    pub page_height: f64,
}

/// JSON representation of a [`Document`].
#[derive(Serialize, Clone, Debug)]
pub struct DocumentView {
    pub id: i64,
    pub file: String,
    pub num_pages: Option<i64>,
    pub page_width: Option<f64>,
    pub page_height: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentView {
    pub fn new(document: Document, media_url: &str) -> Self {
        Self {
            id: document.id,
            file: media_url_for(media_url, &document.file),
            num_pages: document.num_pages,
            page_width: document.page_width,
            page_height: document.page_height,
            uploaded_at: document.uploaded_at,
        }
    }
}
