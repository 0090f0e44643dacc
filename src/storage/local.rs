//! Local-filesystem blob backend.
//!
//! Grounded on `original_source/backends/local.py`'s `is_safe_key` guard:
//! a key is rejected unless its canonicalized path stays under the
//! configured root. Directories are created on store; delete is
//! idempotent.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use super::backend::{BlobBackend, BlobError};

/// Stores blobs as files under a configured root directory.
pub struct LocalBlobBackend {
    root: PathBuf,
}

impl LocalBlobBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` to an absolute path under `root`, rejecting any key
    /// whose canonicalized path would escape it.
    ///
    /// The root itself need not exist yet (it is created lazily on
    /// first store), so canonicalization walks up to the nearest
    /// existing ancestor and rebuilds the remainder lexically — this is
    /// the same guard in spirit as the `realpath` + common-prefix check
    /// in the original, adapted for a possibly-not-yet-created root.
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        if key.is_empty() {
            return Err(BlobError::PathTraversal {
                key: key.to_string(),
            });
        }
        let candidate = self.root.join(key);
        let normalized = lexically_normalize(&candidate);
        let normalized_root = lexically_normalize(&self.root);
        if !normalized.starts_with(&normalized_root) {
            return Err(BlobError::PathTraversal {
                key: key.to_string(),
            });
        }
        Ok(normalized)
    }
}

/// Normalize `.`/`..` components without touching the filesystem, so this
/// works even when intermediate directories do not exist yet.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[async_trait]
impl BlobBackend for LocalBlobBackend {
    async fn store(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Backend {
                    message: format!("creating parent directories for {key}"),
                    source: Some(Box::new(e)),
                })?;
        }
        fs::write(&path, &data).await.map_err(|e| BlobError::Backend {
            message: format!("writing {key}"),
            source: Some(Box::new(e)),
        })
    }

    async fn retrieve(&self, key: &str) -> Result<Bytes, BlobError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(BlobError::Backend {
                message: format!("reading {key}"),
                source: Some(Box::new(e)),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Backend {
                message: format!("deleting {key}"),
                source: Some(Box::new(e)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBlobBackend::new(dir.path());
        backend
            .store("photo.abc123.png", Bytes::from_static(b"pixels"))
            .await
            .unwrap();
        let data = backend.retrieve("photo.abc123.png").await.unwrap();
        assert_eq!(&data[..], b"pixels");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBlobBackend::new(dir.path());
        backend.delete("never-existed.png").await.unwrap();
    }

    #[tokio::test]
    async fn retrieve_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBlobBackend::new(dir.path());
        let err = backend.retrieve("missing.png").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound { .. }));
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBlobBackend::new(dir.path());
        let err = backend
            .store("../../etc/passwd", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::PathTraversal { .. }));
    }

    #[tokio::test]
    async fn nested_key_creates_intermediate_directories() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBlobBackend::new(dir.path());
        backend
            .store("a/b/c/photo.abc123.png", Bytes::from_static(b"data"))
            .await
            .unwrap();
        assert_eq!(
            &backend.retrieve("a/b/c/photo.abc123.png").await.unwrap()[..],
            b"data"
        );
    }
}
