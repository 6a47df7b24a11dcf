//! Represents a raster image stored in the media root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::media_url_for;

/// A stored image.
///
/// The record holds derived metadata only; the pixel data lives in the blob
/// store under `file`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Image {
    /// Store-assigned identifier, never reused after deletion.
    pub id: i64,

    /// Blob key relative to the media root (e.g. `images/<uuid>.png`).
    pub file: String,

    /// Width in pixels.
    pub width: Option<i64>,

    /// Height in pixels.
    pub height: Option<i64>,

    /// Number of colour channels (1 = grey, 3 = RGB, 4 = RGBA, ...).
    pub channels: Option<i64>,

    /// When the image record was created.
    pub uploaded_at: DateTime<Utc>,
}

/// Fields required to create or replace the content of an [`Image`].
#[derive(Clone, Debug)]
pub struct NewImage {
    pub file: String,
    pub width: i64,
    pub height: i64,
    pub channels: i64,
}

/// JSON representation of an [`Image`].
#[derive(Serialize, Clone, Debug)]
pub struct ImageView {
    pub id: i64,
    pub file: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub channels: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

impl ImageView {
    pub fn new(image: Image, media_url: &str) -> Self {
        Self {
            id: image.id,
            file: media_url_for(media_url, &image.file),
            width: image.width,
            height: image.height,
            channels: image.channels,
            uploaded_at: image.uploaded_at,
        }
    }
}
