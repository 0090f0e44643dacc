//! The `BlobBackend` trait and its error taxonomy.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Errors a blob backend can report. Backends never retry internally;
/// callers decide whether a failure is recoverable.
#[derive(Debug)]
pub enum BlobError {
    /// The requested key does not exist. `retrieve` returns this; `delete`
    /// never does — delete is idempotent.
    NotFound { key: String },
    /// The key, once canonicalized, would resolve outside the backend's
    /// configured root.
    PathTraversal { key: String },
    /// Credentials or connection settings are invalid or incomplete.
    Misconfigured { message: String },
    /// An I/O or network error occurred.
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "blob not found: {key}"),
            Self::PathTraversal { key } => write!(f, "key escapes storage root: {key}"),
            Self::Misconfigured { message } => write!(f, "backend misconfigured: {message}"),
            Self::Backend { message, .. } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// A keyed blob store. Implementations are per-account and per-security-
/// class (public vs. secure) at the call site, not inside the backend
/// itself — the backend only knows about keys and bytes.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store `data` under `key`, creating any intermediate structure the
    /// backend needs (directories, prefixes). Overwrites existing data.
    async fn store(&self, key: &str, data: Bytes) -> Result<(), BlobError>;

    /// Retrieve the bytes stored under `key`.
    async fn retrieve(&self, key: &str) -> Result<Bytes, BlobError>;

    /// Delete the blob at `key`. Idempotent: deleting a missing key is a
    /// success, not a [`BlobError::NotFound`].
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Round-trip a disposable key to verify the backend's credentials and
    /// connectivity, used by the "secure settings" validation pass when an
    /// account's backend configuration changes.
    async fn test_credentials(&self) -> Result<(), BlobError> {
        let probe_key = format!(".h51-credential-probe-{}", uuid::Uuid::new_v4());
        self.store(&probe_key, Bytes::from_static(b"ok")).await?;
        let read_back = self.retrieve(&probe_key).await?;
        self.delete(&probe_key).await?;
        if read_back.as_ref() != b"ok" {
            return Err(BlobError::Backend {
                message: "credential probe read back unexpected bytes".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}
