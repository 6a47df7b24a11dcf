//! src/storage/asset_store.rs
//!
//! Durable metadata records for images and PDFs. The `AssetStore` trait is
//! the capability handed to the service layer; `SqliteAssetStore` backs it
//! with an sqlx SQLite pool (file-backed in production, in-memory in tests).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::debug;

use crate::models::{
    document::{Document, NewDocument},
    image::{Image, NewImage},
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const IMAGE_COLUMNS: &str = "id, file, width, height, channels, uploaded_at";
const DOCUMENT_COLUMNS: &str = "id, file, num_pages, page_width, page_height, uploaded_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("asset store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Create/read/update/delete access to image and PDF records.
///
/// Listing returns records in insertion order.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn insert_image(&self, image: NewImage) -> StoreResult<Image>;

    /// Insert several images atomically, returning them in input order.
    async fn insert_images(&self, images: Vec<NewImage>) -> StoreResult<Vec<Image>>;

    async fn get_image(&self, id: i64) -> StoreResult<Option<Image>>;

    async fn list_images(&self) -> StoreResult<Vec<Image>>;

    /// Replace the blob key and derived metadata of an existing image.
    /// Returns `None` when the image does not exist.
    async fn update_image(&self, id: i64, image: NewImage) -> StoreResult<Option<Image>>;

    /// Delete an image, returning the removed record.
    async fn delete_image(&self, id: i64) -> StoreResult<Option<Image>>;

    async fn insert_document(&self, document: NewDocument) -> StoreResult<Document>;

    async fn get_document(&self, id: i64) -> StoreResult<Option<Document>>;

    async fn list_documents(&self) -> StoreResult<Vec<Document>>;

    async fn delete_document(&self, id: i64) -> StoreResult<Option<Document>>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct SqliteAssetStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteAssetStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// A private in-memory database with the schema applied.
    ///
    /// Limited to one connection: every SQLite memory connection is its own
    /// database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(Arc::new(pool));
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> StoreResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }
}

#[async_trait]
impl AssetStore for SqliteAssetStore {
    async fn insert_image(&self, image: NewImage) -> StoreResult<Image> {
        let record = sqlx::query_as::<_, Image>(&format!(
            "INSERT INTO images (file, width, height, channels, uploaded_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(&image.file)
        .bind(image.width)
        .bind(image.height)
        .bind(image.channels)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(record)
    }

    async fn insert_images(&self, images: Vec<NewImage>) -> StoreResult<Vec<Image>> {
        let sql = format!(
            "INSERT INTO images (file, width, height, channels, uploaded_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {IMAGE_COLUMNS}"
        );

        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(images.len());
        for image in images {
            let record = sqlx::query_as::<_, Image>(&sql)
                .bind(&image.file)
                .bind(image.width)
                .bind(image.height)
                .bind(image.channels)
                .bind(Utc::now())
                .fetch_one(&mut *tx)
                .await?;
            created.push(record);
        }
        tx.commit().await?;

        Ok(created)
    }

    async fn get_image(&self, id: i64) -> StoreResult<Option<Image>> {
        let record =
            sqlx::query_as::<_, Image>(&format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?"))
                .bind(id)
                .fetch_optional(&*self.db)
                .await?;
        Ok(record)
    }

    async fn list_images(&self) -> StoreResult<Vec<Image>> {
        let records = sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images ORDER BY id ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(records)
    }

    async fn update_image(&self, id: i64, image: NewImage) -> StoreResult<Option<Image>> {
        let record = sqlx::query_as::<_, Image>(&format!(
            "UPDATE images SET file = ?, width = ?, height = ?, channels = ?
             WHERE id = ?
             RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(&image.file)
        .bind(image.width)
        .bind(image.height)
        .bind(image.channels)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn delete_image(&self, id: i64) -> StoreResult<Option<Image>> {
        let record = sqlx::query_as::<_, Image>(&format!(
            "DELETE FROM images WHERE id = ? RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn insert_document(&self, document: NewDocument) -> StoreResult<Document> {
        let record = sqlx::query_as::<_, Document>(&format!(
            "INSERT INTO pdfs (file, num_pages, page_width, page_height, uploaded_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(&document.file)
        .bind(document.num_pages)
        .bind(document.page_width)
        .bind(document.page_height)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(record)
    }

    async fn get_document(&self, id: i64) -> StoreResult<Option<Document>> {
        let record = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM pdfs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn list_documents(&self) -> StoreResult<Vec<Document>> {
        let records = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM pdfs ORDER BY id ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(records)
    }

    async fn delete_document(&self, id: i64) -> StoreResult<Option<Document>> {
        let record = sqlx::query_as::<_, Document>(&format!(
            "DELETE FROM pdfs WHERE id = ? RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn ping(&self) -> StoreResult<()> {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?
        {
            1 => Ok(()),
            other => Err(StoreError::Unavailable(format!(
                "unexpected result: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_image(file: &str) -> NewImage {
        NewImage {
            file: file.to_string(),
            width: 100,
            height: 50,
            channels: 3,
        }
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let store = SqliteAssetStore::in_memory().await.unwrap();
        assert_eq!(store.migrate().await.unwrap(), 2);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn lists_images_in_insertion_order() {
        let store = SqliteAssetStore::in_memory().await.unwrap();
        assert!(store.list_images().await.unwrap().is_empty());

        let a = store.insert_image(new_image("images/a.png")).await.unwrap();
        let b = store.insert_image(new_image("images/b.png")).await.unwrap();

        let listed = store.list_images().await.unwrap();
        assert_eq!(listed, vec![a, b]);
    }

    #[tokio::test]
    async fn batch_insert_preserves_order() {
        let store = SqliteAssetStore::in_memory().await.unwrap();
        let created = store
            .insert_images(vec![
                new_image("images/p1.png"),
                new_image("images/p2.png"),
                new_image("images/p3.png"),
            ])
            .await
            .unwrap();

        let files: Vec<_> = created.iter().map(|i| i.file.as_str()).collect();
        assert_eq!(files, ["images/p1.png", "images/p2.png", "images/p3.png"]);
        assert!(created.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn update_replaces_content_but_keeps_creation_time() {
        let store = SqliteAssetStore::in_memory().await.unwrap();
        let original = store.insert_image(new_image("images/a.png")).await.unwrap();

        let updated = store
            .update_image(
                original.id,
                NewImage {
                    file: "images/rotated.png".into(),
                    width: 50,
                    height: 100,
                    channels: 4,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.file, "images/rotated.png");
        assert_eq!((updated.width, updated.height), (Some(50), Some(100)));
        assert_eq!(updated.channels, Some(4));
        assert_eq!(updated.uploaded_at, original.uploaded_at);

        assert!(store.update_image(999, new_image("x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_returns_record_once() {
        let store = SqliteAssetStore::in_memory().await.unwrap();
        let doc = store
            .insert_document(NewDocument {
                file: "pdfs/a.pdf".into(),
                num_pages: 2,
                page_width: 612.0,
                page_height: 792.0,
            })
            .await
            .unwrap();

        assert_eq!(store.delete_document(doc.id).await.unwrap(), Some(doc.clone()));
        assert!(store.delete_document(doc.id).await.unwrap().is_none());
        assert!(store.get_document(doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let store = SqliteAssetStore::in_memory().await.unwrap();
        let first = store.insert_image(new_image("images/a.png")).await.unwrap();
        store.delete_image(first.id).await.unwrap();
        let second = store.insert_image(new_image("images/b.png")).await.unwrap();
        assert!(second.id > first.id);
    }
}
