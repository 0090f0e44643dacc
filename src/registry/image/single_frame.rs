//! `single_frame` transform — select one frame from an animation, dropping
//! the rest of the frame stack and any loop/duration metadata.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::decode_if_empty;
use crate::registry::analyzer::CapabilityError;
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};
use crate::registry::transform::{FrameState, Transform, TransformContext};

pub struct SingleFrameTransform;

#[async_trait]
impl Transform for SingleFrameTransform {
    fn name(&self) -> &'static str {
        "single_frame"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::new(vec![FieldSpec::optional_with_default(
            "index",
            FieldKind::Int { min: Some(0), max: None },
            json!(0),
        )])
    }

    fn is_final(&self) -> bool {
        false
    }

    async fn apply(
        &self,
        settings: &Value,
        ctx: &mut TransformContext<'_>,
    ) -> Result<(), CapabilityError> {
        decode_if_empty(&mut ctx.state, ctx.original_blob)?;

        let index = settings["index"].as_u64().unwrap_or(0) as usize;

        if let FrameState::Frames { frames, .. } = &mut ctx.state {
            if frames.is_empty() {
                return Err(CapabilityError::Other("no frames to select from".to_string()));
            }
            let selected = frames[index.min(frames.len() - 1)].clone();
            *frames = vec![selected];
        }
        // Selecting a single frame breaks any animation loop/timing that
        // remained from the source.
        if let FrameState::Frames {
            delays_ms,
            loop_forever,
            ..
        } = &mut ctx.state
        {
            *delays_ms = vec![0];
            *loop_forever = false;
        }
        ctx.history.push(self.name().to_string());
        Ok(())
    }
}
