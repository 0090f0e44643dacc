//! The `Transform` capability trait and the in-memory frame-stack state it
//! operates on.
//!
//! Re-expresses the source's living mutable frame list as a tagged-variant
//! state object, per the redesign notes: `Empty | Frames | Encoded`, with
//! re-entry after `Encoded` forbidden except at a final step (enforced by
//! the registry's "exactly one final transform, last" validation, not by
//! this type itself).

use async_trait::async_trait;
use image::DynamicImage;
use serde_json::Value;

use super::analyzer::CapabilityError;
use super::schema::SettingsSchema;
use crate::domain::Asset;

/// The in-memory frame stack threaded through a transform pipeline.
pub enum FrameState {
    /// No frames decoded yet; the first transform must decode the source
    /// blob.
    Empty,
    /// A decoded stack of frames (more than one only for animations),
    /// alongside optional per-frame delays and loop count carried from the
    /// source, if any.
    Frames {
        frames: Vec<DynamicImage>,
        delays_ms: Vec<u32>,
        loop_forever: bool,
    },
    /// The final, encoded bytes produced by a `final` transform. Terminal:
    /// no further transform may run after this state in a given pipeline.
    Encoded { content_type: String, ext: String, data: Vec<u8> },
}

impl FrameState {
    pub fn is_encoded(&self) -> bool {
        matches!(self, Self::Encoded { .. })
    }
}

/// The mutable context threaded through one `GenerateVariation` pipeline
/// run: the asset being processed, its original blob, the variation name
/// being produced, the accumulating frame state, and the ordered names of
/// transforms already applied (consulted by `focal_point_crop`'s
/// `as_fallback`).
pub struct TransformContext<'a> {
    pub asset: &'a Asset,
    pub original_blob: &'a [u8],
    pub variation_name: &'a str,
    pub state: FrameState,
    pub history: Vec<String>,
}

/// A capability that mutates the in-memory frame stack. Intermediate
/// transforms return an updated `FrameState::Frames`; the single `final`
/// transform in a pipeline encodes to `FrameState::Encoded` and the worker
/// then calls the variation-storage contract — the transform itself never
/// writes storage.
#[async_trait]
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;
    fn schema(&self) -> SettingsSchema;
    /// Whether this transform produces a stored variation (`output` is the
    /// only one currently registered). Exactly one `final` transform may
    /// appear, and only as the last step.
    fn is_final(&self) -> bool;

    async fn apply(
        &self,
        settings: &Value,
        ctx: &mut TransformContext<'_>,
    ) -> Result<(), CapabilityError>;
}
