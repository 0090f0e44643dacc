//! Image analyzers and transforms.
//!
//! Each capability's contract (inputs, outputs, invariants) is grounded on
//! the corresponding `original_source/analyzers|transforms/images/*.py`
//! file; the underlying pixel library is the `image` crate rather than
//! PIL, per the capability-contract framing in the governing spec.

pub mod animation;
pub mod auto_orient;
pub mod crop;
pub mod dominant_colors;
pub mod fit;
pub mod focal_point;
pub mod focal_point_crop;
pub mod output;
pub mod rotate;
pub mod single_frame;

/// Decode `blob` into the frame stack if no transform has decoded it yet.
/// Every transform calls this first so the pipeline can start from any
/// step without requiring a dedicated "decode" transform.
pub(crate) fn decode_if_empty(
    state: &mut super::transform::FrameState,
    blob: &[u8],
) -> Result<(), super::analyzer::CapabilityError> {
    use super::transform::FrameState;
    if matches!(state, FrameState::Empty) {
        let decoded = ::image::load_from_memory(blob)
            .map_err(|e| super::analyzer::CapabilityError::Decode(e.to_string()))?;
        *state = FrameState::Frames {
            frames: vec![decoded],
            delays_ms: vec![0],
            loop_forever: false,
        };
    }
    Ok(())
}
