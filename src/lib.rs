//! h51 — an asynchronous asset-processing service.
//!
//! Clients upload files (predominantly images) through an authenticated
//! HTTP API and request derived artefacts: analytical metadata (dominant
//! colors, focal points, animation info) and transformed variations (crops,
//! resizes, re-encodings). Processing happens asynchronously on a pool of
//! workers coordinated through a shared task queue; results are either
//! awaited synchronously on the originating request or delivered via a
//! signed webhook callback.
//!
//! # Module organization
//!
//! - [`domain`] — core entities: accounts, assets, variations, tasks.
//! - [`queue`] — the task queue: claim discipline, shuffled dequeue, locks.
//! - [`events`] — the task lifecycle event bus.
//! - [`ratelimit`] — per-account rate limiting and API call logging.
//! - [`storage`] — blob storage backends (local filesystem, object store).
//! - [`registry`] — the analyzer/transform capability registry.
//! - [`worker`] — the worker state machine and analyzer/transform pipelines.
//! - [`notifier`] — signed webhook delivery.
//! - [`api`] — the HTTP API front-end (axum handlers).
//! - [`config`] — runtime configuration.
//! - [`error`] — the `ApiError` taxonomy shared by the API and workers.
//! - [`bootstrap`] — shared Redis-backed startup plumbing for the binaries.

pub mod accounts;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod notifier;
pub mod queue;
pub mod ratelimit;
pub mod registry;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use config::Config;
pub use error::{ApiError, ErrorType};
