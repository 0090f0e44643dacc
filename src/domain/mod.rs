//! Core entities: accounts, assets, variations, tasks, and stats.
//!
//! Mirrors the `domain` module in the teacher crate: plain data types with
//! constructors and small invariant-preserving methods, kept separate from
//! the storage and queue layers that persist them.

pub mod account;
pub mod asset;
pub mod stats;
pub mod task;

pub use account::{Account, BackendSettings};
pub use asset::{generate_uid, next_version, Asset, AssetType, Variation};
pub use stats::{inc_keys, time_scopes, StatDelta, StatName};
pub use task::{AnalyzeStep, Task, TaskPayload, TransformStep};
