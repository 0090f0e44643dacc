//! `animation` analyzer — grounded on
//! `original_source/analyzers/images/animation.py`.
//!
//! No settings. Output: `{frames, durations, loop}`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::Asset;
use crate::registry::analyzer::{Analyzer, CapabilityError};
use crate::registry::schema::SettingsSchema;

pub struct AnimationAnalyzer;

#[async_trait]
impl Analyzer for AnimationAnalyzer {
    fn name(&self) -> &'static str {
        "animation"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::default()
    }

    async fn analyze(
        &self,
        _settings: &Value,
        asset: &mut Asset,
        blob: &[u8],
        _history: &[String],
    ) -> Result<(), CapabilityError> {
        let (frame_count, durations_ms, loop_forever) = probe_gif_animation(blob);

        asset
            .meta
            .entry("image".to_string())
            .or_insert_with(|| json!({}));
        if let Some(image_meta) = asset.meta.get_mut("image").and_then(|v| v.as_object_mut()) {
            image_meta.insert(
                "animation".to_string(),
                json!({
                    "frames": frame_count,
                    "durations": durations_ms,
                    "loop": loop_forever,
                }),
            );
        }
        asset.touch();
        Ok(())
    }
}

/// Count frames and per-frame delays for an animated GIF. Non-GIF or
/// single-frame inputs report `frames: 1` and an empty duration list, which
/// is the same "not animated" shape the original reports for static images.
fn probe_gif_animation(blob: &[u8]) -> (usize, Vec<u32>, bool) {
    use image::codecs::gif::GifDecoder;
    use image::AnimationDecoder;

    match GifDecoder::new(std::io::Cursor::new(blob)) {
        Ok(decoder) => match decoder.into_frames().collect_frames() {
            Ok(frames) => {
                let durations: Vec<u32> = frames
                    .iter()
                    .map(|frame| {
                        let (numerator, _) = frame.delay().numer_denom_ms();
                        numerator
                    })
                    .collect();
                (frames.len(), durations, true)
            }
            Err(_) => (1, vec![], false),
        },
        Err(_) => (1, vec![], false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn static_image_reports_single_frame() {
        let analyzer = AnimationAnalyzer;
        let mut asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        analyzer
            .analyze(&json!({}), &mut asset, &bytes, &[])
            .await
            .unwrap();
        assert_eq!(asset.meta["image"]["animation"]["frames"], json!(1));
    }
}
