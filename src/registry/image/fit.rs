//! `fit` transform — thumbnail into a bounding box, preserving aspect
//! ratio, with a configurable resample filter.

use async_trait::async_trait;
use image::imageops::FilterType;
use serde_json::Value;

use super::decode_if_empty;
use crate::registry::analyzer::CapabilityError;
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};
use crate::registry::transform::{FrameState, Transform, TransformContext};
use serde_json::json;

pub struct FitTransform;

fn filter_from_str(name: &str) -> FilterType {
    match name {
        "nearest" => FilterType::Nearest,
        "triangle" => FilterType::Triangle,
        "catmull_rom" => FilterType::CatmullRom,
        "gaussian" => FilterType::Gaussian,
        _ => FilterType::Lanczos3,
    }
}

#[async_trait]
impl Transform for FitTransform {
    fn name(&self) -> &'static str {
        "fit"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::new(vec![
            FieldSpec::required("width", FieldKind::Int { min: Some(1), max: None }),
            FieldSpec::required("height", FieldKind::Int { min: Some(1), max: None }),
            FieldSpec::optional_with_default(
                "resample",
                FieldKind::Enum(vec!["nearest", "triangle", "catmull_rom", "gaussian", "lanczos3"]),
                json!("lanczos3"),
            ),
        ])
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

        let width = settings["width"].as_u64().unwrap_or(1) as u32;
        let height = settings["height"].as_u64().unwrap_or(1) as u32;
        let filter = filter_from_str(settings["resample"].as_str().unwrap_or("lanczos3"));

        if let FrameState::Frames { frames, .. } = &mut ctx.state {
            for frame in frames.iter_mut() {
                *frame = frame.resize(width, height, filter);
            }
        }
        ctx.history.push(self.name().to_string());
        Ok(())
    }
}
