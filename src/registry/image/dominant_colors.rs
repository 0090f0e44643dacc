//! `dominant_colors` analyzer — grounded on
//! `original_source/analyzers/images/dominant_colors.py`.
//!
//! Settings: `max_colors`, `min_weight`, `max_sample_size`. Output:
//! `{colors: [{rgb: [r,g,b], weight}]}`, sorted descending by weight and
//! filtered to entries at or above `min_weight`.

use std::collections::HashMap;

use async_trait::async_trait;
use image::GenericImageView;
use serde_json::{json, Value};

use crate::domain::Asset;
use crate::registry::analyzer::{Analyzer, CapabilityError};
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};

pub struct DominantColorsAnalyzer;

impl DominantColorsAnalyzer {
    fn schema() -> SettingsSchema {
        SettingsSchema::new(vec![
            FieldSpec::optional_with_default(
                "max_colors",
                FieldKind::Int {
                    min: Some(1),
                    max: Some(32),
                },
                json!(8),
            ),
            FieldSpec::optional_with_default(
                "min_weight",
                FieldKind::Float {
                    min: Some(0.0),
                    max: Some(1.0),
                },
                json!(0.0),
            ),
            FieldSpec::optional_with_default(
                "max_sample_size",
                FieldKind::Int {
                    min: Some(1),
                    max: None,
                },
                json!(10_000),
            ),
        ])
    }
}

#[async_trait]
impl Analyzer for DominantColorsAnalyzer {
    fn name(&self) -> &'static str {
        "dominant_colors"
    }

    fn schema(&self) -> SettingsSchema {
        DominantColorsAnalyzer::schema()
    }

    async fn analyze(
        &self,
        settings: &Value,
        asset: &mut Asset,
        blob: &[u8],
        _history: &[String],
    ) -> Result<(), CapabilityError> {
        let max_colors = settings["max_colors"].as_u64().unwrap_or(8) as usize;
        let min_weight = settings["min_weight"].as_f64().unwrap_or(0.0);
        let max_sample_size = settings["max_sample_size"].as_u64().unwrap_or(10_000) as u32;

        let decoded =
            image::load_from_memory(blob).map_err(|e| CapabilityError::Decode(e.to_string()))?;
        let (width, height) = decoded.dimensions();
        let sampled = if width.max(height) > max_sample_size {
            decoded.thumbnail(max_sample_size, max_sample_size)
        } else {
            decoded
        };

        let mut counts: HashMap<(u8, u8, u8), u64> = HashMap::new();
        let mut total = 0u64;
        for (_, _, pixel) in sampled.to_rgb8().enumerate_pixels() {
            *counts.entry((pixel[0], pixel[1], pixel[2])).or_insert(0) += 1;
            total += 1;
        }

        let mut ranked: Vec<((u8, u8, u8), u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let colors: Vec<Value> = ranked
            .into_iter()
            .take(max_colors)
            .map(|(rgb, count)| (rgb, count as f64 / total.max(1) as f64))
            .filter(|(_, weight)| *weight >= min_weight)
            .map(|(rgb, weight)| json!({"rgb": [rgb.0, rgb.1, rgb.2], "weight": weight}))
            .collect();

        asset
            .meta
            .entry("image".to_string())
            .or_insert_with(|| json!({}));
        if let Some(image_meta) = asset.meta.get_mut("image").and_then(|v| v.as_object_mut()) {
            image_meta.insert(
                "dominant_colors".to_string(),
                json!({"colors": colors}),
            );
        }
        asset.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn solid_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(10, 10, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn colors_are_sorted_descending_and_non_empty() {
        let analyzer = DominantColorsAnalyzer;
        let mut asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = solid_png();
        analyzer
            .analyze(&json!({"max_colors": 4, "min_weight": 0.0}), &mut asset, &blob, &[])
            .await
            .unwrap();
        let colors = asset.meta["image"]["dominant_colors"]["colors"]
            .as_array()
            .unwrap();
        assert!(!colors.is_empty());
        assert_eq!(colors[0]["rgb"], json!([10, 20, 30]));
        assert!(colors[0]["weight"].as_f64().unwrap() > 0.0);
    }
}
