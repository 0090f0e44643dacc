//! `focal_point_crop` transform — grounded on
//! `original_source/transforms/images/focal_point_crop.py`.
//!
//! Crops around the asset's stored focal point (falling back to image
//! center when no `focal_point` analyzer output is present), either to a
//! target `aspect_ratio` or using explicit padding around the focal point.
//! `aspect_ratio` and padding are mutually exclusive. `as_fallback` skips
//! the crop entirely when a `crop` transform already ran earlier in this
//! pipeline (checked against `history`), matching the original's avoidance
//! of double-cropping when the caller already cropped explicitly.

use async_trait::async_trait;
use image::GenericImageView;
use serde_json::{json, Value};

use super::decode_if_empty;
use crate::registry::analyzer::CapabilityError;
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};
use crate::registry::transform::{FrameState, Transform, TransformContext};

pub struct FocalPointCropTransform;

#[async_trait]
impl Transform for FocalPointCropTransform {
    fn name(&self) -> &'static str {
        "focal_point_crop"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::new(vec![
            FieldSpec {
                name: "aspect_ratio",
                kind: FieldKind::Float { min: Some(0.0), max: None },
                optional: true,
                default: None,
            },
            FieldSpec::optional_with_default(
                "padding_top",
                FieldKind::Float { min: Some(0.0), max: Some(1.0) },
                json!(0.0),
            ),
            FieldSpec::optional_with_default(
                "padding_left",
                FieldKind::Float { min: Some(0.0), max: Some(1.0) },
                json!(0.0),
            ),
            FieldSpec::optional_with_default(
                "padding_bottom",
                FieldKind::Float { min: Some(0.0), max: Some(1.0) },
                json!(0.0),
            ),
            FieldSpec::optional_with_default(
                "padding_right",
                FieldKind::Float { min: Some(0.0), max: Some(1.0) },
                json!(0.0),
            ),
            FieldSpec::optional_with_default("as_fallback", FieldKind::Bool, json!(false)),
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
        let as_fallback = settings["as_fallback"].as_bool().unwrap_or(false);
        if as_fallback && ctx.history.iter().any(|name| name == "crop") {
            ctx.history.push(self.name().to_string());
            return Ok(());
        }

        let aspect_ratio = settings.get("aspect_ratio").and_then(Value::as_f64);
        let padding = [
            settings["padding_top"].as_f64().unwrap_or(0.0),
            settings["padding_left"].as_f64().unwrap_or(0.0),
            settings["padding_bottom"].as_f64().unwrap_or(0.0),
            settings["padding_right"].as_f64().unwrap_or(0.0),
        ];
        if aspect_ratio.is_some() && padding.iter().any(|p| *p != 0.0) {
            return Err(CapabilityError::InvalidSettings(
                "aspect_ratio and padding may not both be set".to_string(),
            ));
        }

        decode_if_empty(&mut ctx.state, ctx.original_blob)?;

        let focal_x = ctx
            .asset
            .meta
            .get("image")
            .and_then(|m| m.get("focal_point"))
            .and_then(|fp| fp.get("x"))
            .and_then(Value::as_f64)
            .unwrap_or(0.5);
        let focal_y = ctx
            .asset
            .meta
            .get("image")
            .and_then(|m| m.get("focal_point"))
            .and_then(|fp| fp.get("y"))
            .and_then(Value::as_f64)
            .unwrap_or(0.5);

        if let FrameState::Frames { frames, .. } = &mut ctx.state {
            for frame in frames.iter_mut() {
                let (width, height) = frame.dimensions();
                let (crop_w, crop_h) = if let Some(ratio) = aspect_ratio {
                    let mut crop_w = width as f64;
                    let mut crop_h = crop_w / ratio;
                    if crop_h > height as f64 {
                        crop_h = height as f64;
                        crop_w = crop_h * ratio;
                    }
                    (crop_w, crop_h)
                } else {
                    let [top, left, bottom, right] = padding;
                    (
                        width as f64 * (1.0 - left - right).max(0.01),
                        height as f64 * (1.0 - top - bottom).max(0.01),
                    )
                };

                let center_x = focal_x * width as f64;
                let center_y = focal_y * height as f64;
                let x = (center_x - crop_w / 2.0).max(0.0).min(width as f64 - crop_w);
                let y = (center_y - crop_h / 2.0).max(0.0).min(height as f64 - crop_h);

                *frame = frame.crop_imm(
                    x.round() as u32,
                    y.round() as u32,
                    crop_w.round().max(1.0) as u32,
                    crop_h.round().max(1.0) as u32,
                );
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
    use uuid::Uuid;

    fn blob(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn as_fallback_skips_when_crop_already_ran() {
        let asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob_data = blob(100, 100);
        let mut ctx = TransformContext {
            asset: &asset,
            original_blob: &blob_data,
            variation_name: "thumb",
            state: FrameState::Empty,
            history: vec!["crop".to_string()],
        };
        FocalPointCropTransform
            .apply(&json!({"as_fallback": true}), &mut ctx)
            .await
            .unwrap();
        assert!(matches!(ctx.state, FrameState::Empty));
    }

    #[tokio::test]
    async fn aspect_ratio_and_padding_together_is_rejected() {
        let asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob_data = blob(100, 100);
        let mut ctx = TransformContext {
            asset: &asset,
            original_blob: &blob_data,
            variation_name: "thumb",
            state: FrameState::Empty,
            history: vec![],
        };
        let err = FocalPointCropTransform
            .apply(&json!({"aspect_ratio": 1.0, "padding_top": 0.1}), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidSettings(_)));
    }
}
