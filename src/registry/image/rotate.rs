//! `rotate` transform — rotate by 90/180/270 degrees clockwise.

use async_trait::async_trait;
use serde_json::Value;

use super::decode_if_empty;
use crate::registry::analyzer::CapabilityError;
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};
use crate::registry::transform::{FrameState, Transform, TransformContext};

pub struct RotateTransform;

#[async_trait]
impl Transform for RotateTransform {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::new(vec![FieldSpec::required(
            "degrees",
            FieldKind::Enum(vec!["90", "180", "270"]),
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

        let degrees = match settings["degrees"].as_str() {
            Some(s) => s.to_string(),
            None => settings["degrees"]
                .as_i64()
                .unwrap_or(90)
                .to_string(),
        };

        if let FrameState::Frames { frames, .. } = &mut ctx.state {
            for frame in frames.iter_mut() {
                *frame = match degrees.as_str() {
                    "90" => frame.rotate90(),
                    "180" => frame.rotate180(),
                    "270" => frame.rotate270(),
                    _ => {
                        return Err(CapabilityError::InvalidSettings(format!(
                            "unsupported rotation {degrees}"
                        )))
                    }
                };
            }
        }
        ctx.history.push(self.name().to_string());
        Ok(())
    }
}
