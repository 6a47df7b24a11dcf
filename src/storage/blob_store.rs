//! Blob bytes stored on local disk beneath the media root.
//!
//! Keys are relative, slash-separated paths such as `images/<uuid>.png`.
//! Writes go to a temporary file first and are renamed into place so a
//! reader never observes a half-written blob.

use async_trait::async_trait;
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_KEY_LEN: usize = 1024;

/// Durable byte storage addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()>;

    async fn read(&self, key: &str) -> io::Result<Vec<u8>>;

    /// Remove a blob. Removing a missing blob is an `ErrorKind::NotFound` error.
    async fn delete(&self, key: &str) -> io::Result<()>;

    /// Write/read/delete round trip used by readiness probes.
    async fn probe(&self) -> io::Result<()>;
}

#[derive(Clone, Debug)]
pub struct FsBlobStore {
    /// Base directory on disk where blobs are stored.
    pub base_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Map a key onto a path under `base_path`.
    ///
    /// Only plain relative components are accepted, so a key can never
    /// address anything outside the media root.
    fn blob_path(&self, key: &str) -> io::Result<PathBuf> {
        let invalid = || io::Error::new(ErrorKind::InvalidInput, format!("invalid blob key `{key}`"));

        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }

        Ok(self.base_path.join(relative))
    }

    /// Remove now-empty directories between `start` and the base path.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let file_path = self.blob_path(key)?;
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("blob path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        debug!("wrote blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        let file_path = self.blob_path(key)?;
        fs::read(&file_path).await
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        let file_path = self.blob_path(key)?;
        fs::remove_file(&file_path).await?;
        debug!("removed blob {}", file_path.display());

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn probe(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(io::Error::other("file content mismatch"));
        }
        Ok(())
    }
}
