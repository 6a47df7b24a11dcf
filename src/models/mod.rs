//! Core data models for the asset API.
//!
//! Records map to SQLite tables via `sqlx::FromRow`; the `*View` types are
//! the JSON representations returned to clients, with blob keys resolved to
//! public media URLs.

pub mod document;
pub mod image;

/// Join a media URL prefix and a blob key into a public URL.
pub fn media_url_for(media_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        media_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}
