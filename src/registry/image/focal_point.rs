//! `focal_point` analyzer — grounded on
//! `original_source/analyzers/images/focal_point.py`.
//!
//! Settings: optional manual `top`/`left`/`bottom`/`right` box (pixels). If
//! omitted, falls back to the image center. Output is a decimal-percentage
//! coordinate `{x, y}` in `[0, 1]`, consumed later by `focal_point_crop`.
//!
//! The original additionally attempts face/point-of-interest detection
//! before falling back to center; that detector is a capability contract
//! summarized rather than reproduced pixel-for-pixel (see governing spec
//! §1) — this analyzer implements the manual-box and center-fallback paths
//! and always falls back to center when no manual box is supplied.

use async_trait::async_trait;
use image::GenericImageView;
use serde_json::{json, Value};

use crate::domain::Asset;
use crate::registry::analyzer::{Analyzer, CapabilityError};
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};

pub struct FocalPointAnalyzer;

#[async_trait]
impl Analyzer for FocalPointAnalyzer {
    fn name(&self) -> &'static str {
        "focal_point"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::new(vec![
            FieldSpec {
                name: "top",
                kind: FieldKind::Int { min: Some(0), max: None },
                optional: true,
                default: None,
            },
            FieldSpec {
                name: "left",
                kind: FieldKind::Int { min: Some(0), max: None },
                optional: true,
                default: None,
            },
            FieldSpec {
                name: "bottom",
                kind: FieldKind::Int { min: Some(0), max: None },
                optional: true,
                default: None,
            },
            FieldSpec {
                name: "right",
                kind: FieldKind::Int { min: Some(0), max: None },
                optional: true,
                default: None,
            },
        ])
    }

    async fn analyze(
        &self,
        settings: &Value,
        asset: &mut Asset,
        blob: &[u8],
        _history: &[String],
    ) -> Result<(), CapabilityError> {
        let decoded =
            image::load_from_memory(blob).map_err(|e| CapabilityError::Decode(e.to_string()))?;
        let (width, height) = decoded.dimensions();

        let manual_box = [
            settings.get("top").and_then(Value::as_f64),
            settings.get("left").and_then(Value::as_f64),
            settings.get("bottom").and_then(Value::as_f64),
            settings.get("right").and_then(Value::as_f64),
        ];

        let (x, y) = if let [Some(top), Some(left), Some(bottom), Some(right)] = manual_box {
            let center_x = (left + right) / 2.0;
            let center_y = (top + bottom) / 2.0;
            (
                center_x / width.max(1) as f64,
                center_y / height.max(1) as f64,
            )
        } else {
            (0.5, 0.5)
        };

        asset
            .meta
            .entry("image".to_string())
            .or_insert_with(|| json!({}));
        if let Some(image_meta) = asset.meta.get_mut("image").and_then(|v| v.as_object_mut()) {
            image_meta.insert("focal_point".to_string(), json!({"x": x, "y": y}));
        }
        asset.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([0, 0, 0]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn no_manual_box_falls_back_to_center() {
        let analyzer = FocalPointAnalyzer;
        let mut asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = blank_png(100, 100);
        analyzer
            .analyze(&json!({}), &mut asset, &blob, &[])
            .await
            .unwrap();
        assert_eq!(asset.meta["image"]["focal_point"]["x"], json!(0.5));
        assert_eq!(asset.meta["image"]["focal_point"]["y"], json!(0.5));
    }

    #[tokio::test]
    async fn manual_box_is_averaged_into_a_percentage() {
        let analyzer = FocalPointAnalyzer;
        let mut asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = blank_png(100, 100);
        analyzer
            .analyze(
                &json!({"top": 0, "left": 0, "bottom": 50, "right": 50}),
                &mut asset,
                &blob,
                &[],
            )
            .await
            .unwrap();
        assert_eq!(asset.meta["image"]["focal_point"]["x"], json!(0.25));
        assert_eq!(asset.meta["image"]["focal_point"]["y"], json!(0.25));
    }
}
