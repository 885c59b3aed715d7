//! Object-storage boundary.
//!
//! The pipeline never assumes a particular backing store; it consumes the
//! four-operation [`ObjectStore`] contract plus the pure key-derivation
//! functions below. [`LocalObjectStore`] backs it with a directory tree and
//! is what tests and single-box deployments use.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// An alternate-resolution re-encoding of a source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    Q720,
    Q480,
}

impl VideoQuality {
    pub const ALL: [VideoQuality; 2] = [VideoQuality::Q720, VideoQuality::Q480];

    /// Suffix appended to derived keys, e.g. `720p`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Q720 => "720p",
            Self::Q480 => "480p",
        }
    }

    /// Target frame height in lines.
    pub fn height(&self) -> u32 {
        match self {
            Self::Q720 => 720,
            Self::Q480 => 480,
        }
    }
}

/// `<base>_<quality>.<ext>` — pure string transform, no storage access.
pub fn derive_quality_key(base_key: &str, quality: VideoQuality) -> String {
    match split_extension(base_key) {
        Some((stem, ext)) => format!("{}_{}.{}", stem, quality.label(), ext),
        None => format!("{}_{}", base_key, quality.label()),
    }
}

/// `<base>_thumb.jpg` — thumbnails are always re-encoded as JPEG.
pub fn derive_thumbnail_key(base_key: &str) -> String {
    match split_extension(base_key) {
        Some((stem, _)) => format!("{}_thumb.jpg", stem),
        None => format!("{}_thumb.jpg", base_key),
    }
}

/// Split off the extension of the final path segment, if any.
fn split_extension(key: &str) -> Option<(&str, &str)> {
    let (stem, ext) = key.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some((stem, ext))
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Does an object exist under this key? Used by admission checks, so it
    /// must reflect actual storage state rather than any cached metadata.
    async fn exists(&self, key: &str) -> Result<bool, PipelineError>;

    async fn get_buffer(&self, key: &str) -> Result<Vec<u8>, PipelineError>;

    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), PipelineError>;

    async fn get_presigned_url(&self, key: &str) -> Result<String, PipelineError>;
}

/// Directory-backed store. Keys map to paths under `root`; presigned URLs
/// are `public_base_url/<key>` since local files need no signing.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Resolve a key to a path under the root, rejecting traversal segments.
    fn resolve(&self, key: &str) -> Result<PathBuf, PipelineError> {
        if key.is_empty() {
            return Err(PipelineError::Storage("empty object key".to_string()));
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(PipelineError::Storage(format!(
                    "invalid object key: {}",
                    key
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn get_buffer(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::Storage(format!("read {}: {}", key, e)))
    }

    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), PipelineError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Storage(format!("mkdir for {}: {}", key, e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::Storage(format!("write {}: {}", key, e)))
    }

    async fn get_presigned_url(&self, key: &str) -> Result<String, PipelineError> {
        self.resolve(key)?;
        Ok(format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            key
        ))
    }
}

/// Copy a stored object to a local file, for tools that want a real path.
pub async fn download_to_path(
    store: &dyn ObjectStore,
    key: &str,
    dest: &Path,
) -> Result<(), PipelineError> {
    let bytes = store.get_buffer(key).await?;
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| PipelineError::Io(format!("write {:?}: {}", dest, e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_derive_quality_key() {
        assert_eq!(
            derive_quality_key("videos/intro.mp4", VideoQuality::Q720),
            "videos/intro_720p.mp4"
        );
        assert_eq!(
            derive_quality_key("videos/intro.mp4", VideoQuality::Q480),
            "videos/intro_480p.mp4"
        );
        // No extension: suffix still lands at the end
        assert_eq!(
            derive_quality_key("videos/raw", VideoQuality::Q720),
            "videos/raw_720p"
        );
        // Dot in a directory name is not an extension
        assert_eq!(
            derive_quality_key("v1.0/clip", VideoQuality::Q480),
            "v1.0/clip_480p"
        );
    }

    #[test]
    fn test_derive_thumbnail_key() {
        assert_eq!(
            derive_thumbnail_key("videos/intro.mp4"),
            "videos/intro_thumb.jpg"
        );
        assert_eq!(derive_thumbnail_key("videos/raw"), "videos/raw_thumb.jpg");
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost:8080/media");

        assert!(!store.exists("videos/a.mp4").await.unwrap());
        store
            .upload("videos/a.mp4", b"content", "video/mp4")
            .await
            .unwrap();
        assert!(store.exists("videos/a.mp4").await.unwrap());
        assert_eq!(store.get_buffer("videos/a.mp4").await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_local_store_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost");
        assert!(store.get_buffer("../etc/passwd").await.is_err());
        assert!(store.upload("", b"x", "text/plain").await.is_err());
    }

    #[tokio::test]
    async fn test_presigned_url_shape() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost:8080/media/");
        let url = store.get_presigned_url("videos/a.mp4").await.unwrap();
        assert_eq!(url, "http://localhost:8080/media/videos/a.mp4");
    }
}
