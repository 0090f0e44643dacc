//! The `Analyzer` capability trait: reads an asset blob, writes structured
//! metadata.

use async_trait::async_trait;
use serde_json::Value;

use super::schema::SettingsSchema;
use crate::domain::Asset;

/// An error raised while running an analyzer or transform.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

/// A capability that reads an asset's blob and writes structured metadata
/// into `asset.meta[asset_type][name]`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;
    fn schema(&self) -> SettingsSchema;

    /// Run the analyzer. `history` lists the names of analyzers already run
    /// earlier in this task's ordered list, so later analyzers may consult
    /// earlier ones' output in `asset.meta`.
    async fn analyze(
        &self,
        settings: &Value,
        asset: &mut Asset,
        blob: &[u8],
        history: &[String],
    ) -> Result<(), CapabilityError>;
}
