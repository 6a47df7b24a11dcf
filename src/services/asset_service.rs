//! src/services/asset_service.rs
//!
//! AssetService — upload, rotate, rasterize, list, fetch, delete and export
//! operations. Record metadata goes through an [`AssetStore`], bytes
//! through a [`BlobStore`], and all pixel work through the injected codecs
//! on the blocking thread pool.
//!
//! Multi-step mutations are ordered so that a failure leaves at worst an
//! orphaned blob, never a record pointing at missing bytes: blobs are
//! written before records are created or updated, and removed only after
//! the record change has committed.

use base64::{Engine as _, engine::general_purpose};
use image::DynamicImage;
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, runtime::Handle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    codecs::{
        CodecError,
        image_codec::{EncodedImage, ImageCodec},
        pdf_codec::DocumentCodec,
    },
    models::{
        document::{Document, NewDocument},
        image::{Image, NewImage},
    },
    storage::{
        asset_store::{AssetStore, StoreError},
        blob_store::BlobStore,
    },
};

const IMAGE_DIR: &str = "images";
const DOCUMENT_DIR: &str = "pdfs";

/// The two kinds of uploadable asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Pdf,
}

impl AssetKind {
    /// Parse the `type` tag of an upload request.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "image" => Some(Self::Image),
            "pdf" | "document" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// A freshly created record of either kind.
#[derive(Clone, Debug)]
pub enum UploadedAsset {
    Image(Image),
    Document(Document),
}

/// A file read by [`AssetService::export_base64`].
#[derive(Clone, Debug)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub base64: String,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("image {0} not found")]
    ImageNotFound(i64),
    #[error("pdf {0} not found")]
    DocumentNotFound(i64),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("invalid pdf: {0}")]
    InvalidDocument(String),
    #[error("path `{0}` is outside the export root")]
    InvalidPath(String),
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Task(String),
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Settings that shape responses and the export utility.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Public URL prefix under which blob keys are served.
    pub media_url: String,
    /// Directory that base64 exports are confined to.
    pub export_root: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            media_url: "/media/".into(),
            export_root: PathBuf::from("."),
        }
    }
}

#[derive(Clone)]
pub struct AssetService {
    pub assets: Arc<dyn AssetStore>,
    pub blobs: Arc<dyn BlobStore>,
    image_codec: Arc<dyn ImageCodec>,
    document_codec: Arc<dyn DocumentCodec>,
    settings: ServiceSettings,
}

impl AssetService {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        blobs: Arc<dyn BlobStore>,
        image_codec: Arc<dyn ImageCodec>,
        document_codec: Arc<dyn DocumentCodec>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            assets,
            blobs,
            image_codec,
            document_codec,
            settings,
        }
    }

    pub fn media_url(&self) -> &str {
        &self.settings.media_url
    }

    /// Validate `bytes` as `kind`, store them and create the record.
    pub async fn upload(&self, kind: AssetKind, bytes: Vec<u8>) -> AssetResult<UploadedAsset> {
        match kind {
            AssetKind::Image => self.upload_image(bytes).await.map(UploadedAsset::Image),
            AssetKind::Pdf => self.upload_document(bytes).await.map(UploadedAsset::Document),
        }
    }

    async fn upload_image(&self, bytes: Vec<u8>) -> AssetResult<Image> {
        let codec = self.image_codec.clone();
        let (decoded, bytes) = run_blocking(move || {
            let decoded = codec.inspect(&bytes).map_err(|err| match err {
                CodecError::Unrecognized(msg) => AssetError::InvalidImage(msg),
                other => AssetError::Codec(other),
            })?;
            Ok((decoded, bytes))
        })
        .await?;

        let key = blob_key(IMAGE_DIR, decoded.extension);
        self.blobs.write(&key, &bytes).await?;

        let record = NewImage {
            file: key.clone(),
            width: decoded.info.width.into(),
            height: decoded.info.height.into(),
            channels: decoded.info.channels.into(),
        };
        let image = match self.assets.insert_image(record).await {
            Ok(image) => image,
            Err(err) => {
                self.discard_blobs(&[key]).await;
                return Err(err.into());
            }
        };

        info!(
            "stored image {} ({}x{}, {} channels)",
            image.id, decoded.info.width, decoded.info.height, decoded.info.channels
        );
        Ok(image)
    }

    async fn upload_document(&self, bytes: Vec<u8>) -> AssetResult<Document> {
        let codec = self.document_codec.clone();
        let (doc_info, bytes) = run_blocking(move || {
            let doc_info = codec.inspect(&bytes).map_err(|err| match err {
                CodecError::Unrecognized(msg) => AssetError::InvalidDocument(msg),
                other => AssetError::Codec(other),
            })?;
            Ok((doc_info, bytes))
        })
        .await?;

        let key = blob_key(DOCUMENT_DIR, "pdf");
        self.blobs.write(&key, &bytes).await?;

        let record = NewDocument {
            file: key.clone(),
            num_pages: doc_info.page_count.into(),
            page_width: doc_info.page_width,
            page_height: doc_info.page_height,
        };
        let document = match self.assets.insert_document(record).await {
            Ok(document) => document,
            Err(err) => {
                self.discard_blobs(&[key]).await;
                return Err(err.into());
            }
        };

        info!(
            "stored pdf {} ({} pages, {}x{} pt)",
            document.id, doc_info.page_count, doc_info.page_width, doc_info.page_height
        );
        Ok(document)
    }

    /// Render every page of a stored PDF into new images, in page order.
    ///
    /// Either every page is persisted or none is: each page is encoded and
    /// its blob written before the next page is rendered, the records are
    /// inserted in one transaction at the end, and the blobs are removed
    /// again if anything fails.
    pub async fn rasterize_document(&self, id: i64) -> AssetResult<Vec<Image>> {
        let document = self
            .assets
            .get_document(id)
            .await?
            .ok_or(AssetError::DocumentNotFound(id))?;
        let bytes = self.blobs.read(&document.file).await?;

        let document_codec = self.document_codec.clone();
        let image_codec = self.image_codec.clone();
        let blobs = self.blobs.clone();
        let runtime = Handle::current();
        let rendered = run_blocking(move || {
            let mut pages = RenderedPages::default();
            let outcome = document_codec.rasterize(&bytes, &mut |_: u32, page: DynamicImage| {
                let encoded = image_codec.encode(&page)?;
                drop(page);
                let key = blob_key(IMAGE_DIR, encoded.extension);
                if let Err(err) = runtime.block_on(blobs.write(&key, &encoded.bytes)) {
                    pages.failure = Some(err.into());
                    return Err(CodecError::Stopped);
                }
                pages.push(key, &encoded);
                Ok(())
            });
            if let Err(err) = outcome {
                // a sink failure is already recorded with its real cause
                if pages.failure.is_none() {
                    pages.failure = Some(err.into());
                }
            }
            Ok(pages)
        })
        .await?;

        let RenderedPages {
            written,
            records,
            failure,
        } = rendered;
        if let Some(err) = failure {
            self.discard_blobs(&written).await;
            return Err(err);
        }
        debug!("rasterized pdf {} into {} pages", id, records.len());

        match self.assets.insert_images(records).await {
            Ok(images) => {
                info!("converted pdf {} into {} images", id, images.len());
                Ok(images)
            }
            Err(err) => {
                self.discard_blobs(&written).await;
                Err(err.into())
            }
        }
    }

    /// Rotate a stored image counter-clockwise and replace its content.
    pub async fn rotate_image(&self, id: i64, degrees: i64) -> AssetResult<Image> {
        let image = self
            .assets
            .get_image(id)
            .await?
            .ok_or(AssetError::ImageNotFound(id))?;
        let bytes = self.blobs.read(&image.file).await?;

        let codec = self.image_codec.clone();
        let rotated = run_blocking(move || Ok(codec.rotate(&bytes, degrees)?)).await?;

        let key = blob_key(IMAGE_DIR, rotated.extension);
        self.blobs.write(&key, &rotated.bytes).await?;

        let replacement = NewImage {
            file: key.clone(),
            width: rotated.info.width.into(),
            height: rotated.info.height.into(),
            channels: rotated.info.channels.into(),
        };
        let updated = match self.assets.update_image(id, replacement).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.discard_blobs(&[key]).await;
                return Err(AssetError::ImageNotFound(id));
            }
            Err(err) => {
                self.discard_blobs(&[key]).await;
                return Err(err.into());
            }
        };

        self.discard_blobs(&[image.file]).await;
        info!(
            "rotated image {} by {} degrees → {}x{}",
            id, degrees, rotated.info.width, rotated.info.height
        );
        Ok(updated)
    }

    pub async fn list_images(&self) -> AssetResult<Vec<Image>> {
        Ok(self.assets.list_images().await?)
    }

    pub async fn list_documents(&self) -> AssetResult<Vec<Document>> {
        Ok(self.assets.list_documents().await?)
    }

    pub async fn get_image(&self, id: i64) -> AssetResult<Image> {
        self.assets
            .get_image(id)
            .await?
            .ok_or(AssetError::ImageNotFound(id))
    }

    pub async fn get_document(&self, id: i64) -> AssetResult<Document> {
        self.assets
            .get_document(id)
            .await?
            .ok_or(AssetError::DocumentNotFound(id))
    }

    /// Delete the record, then its blob.
    pub async fn delete_image(&self, id: i64) -> AssetResult<Image> {
        let image = self
            .assets
            .delete_image(id)
            .await?
            .ok_or(AssetError::ImageNotFound(id))?;
        self.discard_blobs(std::slice::from_ref(&image.file)).await;
        info!("deleted image {}", id);
        Ok(image)
    }

    /// Delete the record, then its blob. Images rasterized from the PDF are kept.
    pub async fn delete_document(&self, id: i64) -> AssetResult<Document> {
        let document = self
            .assets
            .delete_document(id)
            .await?
            .ok_or(AssetError::DocumentNotFound(id))?;
        self.discard_blobs(std::slice::from_ref(&document.file)).await;
        info!("deleted pdf {}", id);
        Ok(document)
    }

    /// Read a file confined to the export root and base64-encode it.
    ///
    /// Relative paths resolve against the export root; absolute paths must
    /// already lie under it. The path must not contain `..` and, once
    /// symlinks are resolved, must still lie inside the root.
    pub async fn export_base64(&self, requested: &str) -> AssetResult<ExportedFile> {
        let requested_path = Path::new(requested);
        if requested_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AssetError::InvalidPath(requested.to_string()));
        }

        let root = fs::canonicalize(&self.settings.export_root).await?;
        let candidate = if requested_path.is_absolute() {
            // existence is never probed outside the root
            let configured_root = std::path::absolute(&self.settings.export_root)?;
            if !requested_path.starts_with(&root) && !requested_path.starts_with(&configured_root)
            {
                return Err(AssetError::InvalidPath(requested.to_string()));
            }
            requested_path.to_path_buf()
        } else {
            root.join(requested_path)
        };

        let resolved = match fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AssetError::FileNotFound(requested.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        if !resolved.starts_with(&root) {
            return Err(AssetError::InvalidPath(requested.to_string()));
        }
        if !fs::metadata(&resolved).await?.is_file() {
            return Err(AssetError::FileNotFound(requested.to_string()));
        }

        let bytes = fs::read(&resolved).await?;
        debug!("exporting {} ({} bytes)", resolved.display(), bytes.len());
        Ok(ExportedFile {
            path: resolved,
            base64: general_purpose::STANDARD.encode(bytes),
        })
    }

    /// Best-effort blob removal; failures only leave orphaned bytes.
    async fn discard_blobs(&self, keys: &[String]) {
        for key in keys {
            match self.blobs.delete(key).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("blob {} already missing", key);
                }
                Err(err) => warn!("failed to remove blob {}: {}", key, err),
            }
        }
    }
}

/// Page blobs written so far during a rasterization, and the error that
/// stopped it, if any.
#[derive(Default)]
struct RenderedPages {
    written: Vec<String>,
    records: Vec<NewImage>,
    failure: Option<AssetError>,
}

impl RenderedPages {
    fn push(&mut self, key: String, page: &EncodedImage) {
        self.written.push(key.clone());
        self.records.push(NewImage {
            file: key,
            width: page.info.width.into(),
            height: page.info.height.into(),
            channels: page.info.channels.into(),
        });
    }
}

/// Generate a collision-resistant blob key such as `images/<uuid>.png`.
fn blob_key(dir: &str, extension: &str) -> String {
    format!("{}/{}.{}", dir, Uuid::new_v4(), extension)
}

async fn run_blocking<T, F>(work: F) -> AssetResult<T>
where
    F: FnOnce() -> AssetResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AssetError::Task(format!("codec task failed: {}", e)))?
}
