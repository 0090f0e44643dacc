//! `output` transform — grounded on
//! `original_source/transforms/images/output.py`. The only `final`
//! transform: encodes the accumulated frame stack to bytes in the
//! requested format.
//!
//! Settings: `image_format` (required, one of GIF/JPEG/PNG/WEBP), `quality`
//! (0-100, default 80), `lossless`/`progressive` (default false),
//! `versioned` (default true — most variations should roll a new version
//! on overwrite so previously-issued URLs stay valid until purge).

use async_trait::async_trait;
use serde_json::{json, Value};

use super::decode_if_empty;
use crate::registry::analyzer::CapabilityError;
use crate::registry::schema::{FieldKind, FieldSpec, SettingsSchema};
use crate::registry::transform::{FrameState, Transform, TransformContext};

pub struct OutputTransform;

#[async_trait]
impl Transform for OutputTransform {
    fn name(&self) -> &'static str {
        "output"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::new(vec![
            FieldSpec::required(
                "image_format",
                FieldKind::Enum(vec!["GIF", "JPEG", "PNG", "WEBP"]),
            ),
            FieldSpec::optional_with_default(
                "quality",
                FieldKind::Int { min: Some(0), max: Some(100) },
                json!(80),
            ),
            FieldSpec::optional_with_default("lossless", FieldKind::Bool, json!(false)),
            FieldSpec::optional_with_default("progressive", FieldKind::Bool, json!(false)),
            FieldSpec::optional_with_default("versioned", FieldKind::Bool, json!(true)),
        ])
    }

    fn is_final(&self) -> bool {
        true
    }

    async fn apply(
        &self,
        settings: &Value,
        ctx: &mut TransformContext<'_>,
    ) -> Result<(), CapabilityError> {
        decode_if_empty(&mut ctx.state, ctx.original_blob)?;

        let format = settings["image_format"].as_str().unwrap_or("PNG");
        let quality = settings["quality"].as_u64().unwrap_or(80) as u8;

        let (frames, _delays, _loop_forever) = match &ctx.state {
            FrameState::Frames {
                frames,
                delays_ms,
                loop_forever,
            } => (frames, delays_ms, *loop_forever),
            _ => return Err(CapabilityError::Other("no decoded frames to encode".to_string())),
        };

        let (content_type, ext, data) = match format {
            "JPEG" => {
                let rgb = frames[0].to_rgb8();
                let mut bytes = Vec::new();
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut bytes,
                    quality,
                );
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| CapabilityError::Other(e.to_string()))?;
                ("image/jpeg".to_string(), "jpg".to_string(), bytes)
            }
            "PNG" => {
                let mut bytes = Vec::new();
                frames[0]
                    .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
                    .map_err(|e| CapabilityError::Other(e.to_string()))?;
                ("image/png".to_string(), "png".to_string(), bytes)
            }
            "WEBP" => {
                let mut bytes = Vec::new();
                frames[0]
                    .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::WebP)
                    .map_err(|e| CapabilityError::Other(e.to_string()))?;
                ("image/webp".to_string(), "webp".to_string(), bytes)
            }
            "GIF" => {
                let mut bytes = Vec::new();
                {
                    let mut encoder = image::codecs::gif::GifEncoder::new(&mut bytes);
                    for frame in frames {
                        let rgba = frame.to_rgba8();
                        let gif_frame = image::Frame::new(rgba);
                        encoder
                            .encode_frame(gif_frame)
                            .map_err(|e| CapabilityError::Other(e.to_string()))?;
                    }
                }
                ("image/gif".to_string(), "gif".to_string(), bytes)
            }
            other => {
                return Err(CapabilityError::InvalidSettings(format!(
                    "unsupported image_format {other}"
                )))
            }
        };

        ctx.state = FrameState::Encoded {
            content_type,
            ext,
            data,
        };
        ctx.history.push(self.name().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Asset;
    use uuid::Uuid;

    #[tokio::test]
    async fn png_output_produces_encoded_state() {
        let asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]));
        let mut blob_data = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut blob_data), image::ImageFormat::Png)
            .unwrap();

        let mut ctx = TransformContext {
            asset: &asset,
            original_blob: &blob_data,
            variation_name: "thumb",
            state: FrameState::Empty,
            history: vec![],
        };
        OutputTransform
            .apply(&json!({"image_format": "PNG"}), &mut ctx)
            .await
            .unwrap();
        match ctx.state {
            FrameState::Encoded { ext, .. } => assert_eq!(ext, "png"),
            _ => panic!("expected Encoded state"),
        }
    }
}
