//! `crop` transform — rectangle crop in unit coordinates `[0, 1]`.

use async_trait::async_trait;
use image::GenericImageView;
use serde_json::Value;

use super::decode_if_empty;
use crate::registry::analyzer::CapabilityError;
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};
use crate::registry::transform::{FrameState, Transform, TransformContext};

pub struct CropTransform;

#[async_trait]
impl Transform for CropTransform {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::new(vec![
            FieldSpec::required("top", FieldKind::Float { min: Some(0.0), max: Some(1.0) }),
            FieldSpec::required("left", FieldKind::Float { min: Some(0.0), max: Some(1.0) }),
            FieldSpec::required("bottom", FieldKind::Float { min: Some(0.0), max: Some(1.0) }),
            FieldSpec::required("right", FieldKind::Float { min: Some(0.0), max: Some(1.0) }),
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

        let top = settings["top"].as_f64().unwrap_or(0.0);
        let left = settings["left"].as_f64().unwrap_or(0.0);
        let bottom = settings["bottom"].as_f64().unwrap_or(1.0);
        let right = settings["right"].as_f64().unwrap_or(1.0);

        if let FrameState::Frames { frames, .. } = &mut ctx.state {
            for frame in frames.iter_mut() {
                let (width, height) = frame.dimensions();
                let x = (left * width as f64).round() as u32;
                let y = (top * height as f64).round() as u32;
                let crop_width = (((right - left) * width as f64).round() as u32)
                    .min(width.saturating_sub(x))
                    .max(1);
                let crop_height = (((bottom - top) * height as f64).round() as u32)
                    .min(height.saturating_sub(y))
                    .max(1);
                *frame = frame.crop_imm(x, y, crop_width, crop_height);
            }
        }
        ctx.history.push(self.name().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Asset;
    use image::GenericImageView;
    use serde_json::json;
    use uuid::Uuid;

    fn asset() -> Asset {
        Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        )
    }

    fn blob(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn crop_halves_the_image() {
        let asset = asset();
        let blob_data = blob(100, 100);
        let mut ctx = TransformContext {
            asset: &asset,
            original_blob: &blob_data,
            variation_name: "thumb",
            state: FrameState::Empty,
            history: vec![],
        };
        CropTransform
            .apply(&json!({"top": 0.0, "left": 0.0, "bottom": 0.5, "right": 0.5}), &mut ctx)
            .await
            .unwrap();
        match ctx.state {
            FrameState::Frames { frames, .. } => {
                assert_eq!(frames[0].dimensions(), (50, 50));
            }
            _ => panic!("expected Frames state"),
        }
    }
}
