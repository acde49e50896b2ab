//! Byte-oriented object storage: named locations (buckets) holding keyed objects.
//!
//! The filesystem backend maps `bucket/key` to `<root>/<bucket>/<key>`. Writes
//! go to a temporary sibling first and are renamed into place, so readers never
//! observe a half-written object.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-write suffix for temporary files; concurrent writers of one key never share a temp path.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub enum StorageError {
    NotFound { bucket: String, key: String },
    InvalidKey(String),
    Io(std::io::Error),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound { bucket, key } => write!(f, "Object not found: {}/{}", bucket, key),
            StorageError::InvalidKey(key) => write!(f, "Invalid object key or bucket: {:?}", key),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Overwrites any existing object under the same key.
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StorageError>;

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

/// Filesystem-backed object store
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `bucket/key` under the root, rejecting anything that could escape it.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_segment(bucket)?;
        if key.is_empty() || key.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let key_path = Path::new(key);
        let only_normal = key_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !only_normal {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(bucket).join(key_path))
    }
}

fn validate_segment(bucket: &str) -> Result<(), StorageError> {
    let valid = !bucket.is_empty()
        && bucket != "."
        && bucket != ".."
        && !bucket.contains('/')
        && !bucket.contains('\\');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(bucket.to_string()))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq));

        tokio::fs::write(&tmp_path, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        log::debug!("📝 Wrote {}/{} ({} bytes)", bucket, key, body.len());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "filesystem"
    }
}
