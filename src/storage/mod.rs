//! Blob storage: a narrow `{store, retrieve, delete}` interface over a keyed
//! byte store, with local-filesystem and S3-compatible implementations.
//!
//! Mirrors the dumb-backend-behind-a-trait shape used by the task store's
//! `StorageBackend`: no domain logic here (no asset rows, no variation
//! bookkeeping) — just bytes in, bytes out, keyed by store key.

pub mod backend;
pub mod local;
pub mod object_store;

use std::path::PathBuf;
use std::sync::Arc;

pub use backend::{BlobBackend, BlobError};
pub use local::LocalBlobBackend;
pub use object_store::{ObjectBlobBackend, ObjectStoreSettings};

use crate::domain::BackendSettings;

/// Build a blob backend from an account's stored settings for one security
/// class. Each call constructs a fresh backend instance; callers that hit
/// this frequently should cache per-account instances themselves.
pub fn build_backend(settings: &BackendSettings) -> Arc<dyn BlobBackend> {
    match settings {
        BackendSettings::Local { root } => Arc::new(LocalBlobBackend::new(PathBuf::from(root))),
        BackendSettings::Object {
            access_key,
            secret_key,
            bucket,
            region,
            endpoint,
        } => Arc::new(ObjectBlobBackend::new(ObjectStoreSettings {
            access_key: access_key.clone(),
            secret_key: secret_key.clone(),
            bucket: bucket.clone(),
            region: region.clone(),
            endpoint: endpoint.clone(),
        })),
    }
}
