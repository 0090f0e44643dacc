//! Intrinsic metadata computed at upload time: image mode/dimensions via
//! `image`, audio channels/sample_rate/length via `symphonia`, `length`
//! (byte size) for every asset type — all nested under the single
//! `meta.<asset_type>` key that type owns, alongside whatever analyzer
//! output later lands next to it. Grounded on the same
//! `image::load_from_memory`/`GenericImageView` call shape used by
//! [`crate::registry::image::dominant_colors`], and on `symphonia`'s
//! standard probe-then-default-track recipe (no crate beyond what
//! `Cargo.toml` already carries for the transform pipelines is needed, so
//! no `infer`-style sniffing crate was added).

use std::collections::HashMap;
use std::io::Cursor;

use image::GenericImageView;
use serde_json::{json, Value};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::domain::AssetType;

/// Probe `data` for intrinsic metadata appropriate to `asset_type`, nested
/// under the single `meta.<asset_type>` key this type owns (`length`
/// alongside whatever type-specific fields the probe recovers) — decode
/// failures are swallowed, leaving just the `length` entry: intrinsic meta
/// is a best-effort convenience, not a validation gate on the upload.
pub fn probe_intrinsic_meta(asset_type: AssetType, ext: &str, data: &[u8]) -> HashMap<String, Value> {
    let mut fields = match asset_type {
        AssetType::Image => probe_image(data).unwrap_or_default(),
        AssetType::Audio => probe_audio(ext, data).unwrap_or_default(),
        AssetType::File => serde_json::Map::new(),
    };
    fields.insert("length".to_string(), json!(data.len() as u64));

    let mut meta = HashMap::new();
    meta.insert(asset_type.as_str().to_string(), Value::Object(fields));
    meta
}

fn probe_image(data: &[u8]) -> Option<serde_json::Map<String, Value>> {
    let decoded = image::load_from_memory(data).ok()?;
    let (width, height) = decoded.dimensions();
    let mut fields = serde_json::Map::new();
    fields.insert("size".to_string(), json!([width, height]));
    fields.insert("mode".to_string(), json!(format!("{:?}", decoded.color())));
    Some(fields)
}

fn probe_audio(ext: &str, data: &[u8]) -> Option<serde_json::Map<String, Value>> {
    let cursor = Cursor::new(data.to_vec());
    let source = MediaSourceStream::new(Box::new(cursor), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if !ext.is_empty() {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;
    let track = probed.format.default_track()?;
    let params = &track.codec_params;

    let channel_count = params.channels.map(|c| c.count() as u64);
    let sample_rate = params.sample_rate.map(|rate| rate as u64);
    let duration_secs = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / rate as f64),
        _ => None,
    };
    let mode = match channel_count {
        Some(1) => "mono",
        Some(2) => "stereo",
        Some(_) => "multi",
        None => "unknown",
    };

    let mut fields = serde_json::Map::new();
    fields.insert("channels".to_string(), json!(channel_count));
    fields.insert("sample_rate".to_string(), json!(sample_rate));
    fields.insert("mode".to_string(), json!(mode));
    if let Some(secs) = duration_secs {
        fields.insert("duration_secs".to_string(), json!(secs));
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_assets_get_only_the_length_field() {
        let meta = probe_intrinsic_meta(AssetType::File, "bin", b"whatever");
        let file_meta = meta.get("file").unwrap().as_object().unwrap();
        assert_eq!(file_meta.get("length").unwrap(), 7);
        assert_eq!(file_meta.len(), 1);
    }

    #[test]
    fn malformed_image_bytes_degrade_to_length_only_without_panicking() {
        let meta = probe_intrinsic_meta(AssetType::Image, "png", b"not an image");
        let image_meta = meta.get("image").unwrap().as_object().unwrap();
        assert_eq!(image_meta.get("length").unwrap(), 12);
        assert!(!image_meta.contains_key("size"));
        assert!(!image_meta.contains_key("mode"));
    }

    #[test]
    fn well_formed_image_bytes_yield_size_and_mode_alongside_length() {
        let mut bytes = Vec::new();
        image::RgbImage::new(4, 2)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let meta = probe_intrinsic_meta(AssetType::Image, "png", &bytes);
        let image_meta = meta.get("image").unwrap().as_object().unwrap();
        assert_eq!(image_meta.get("size").unwrap(), &json!([4, 2]));
        assert!(image_meta.contains_key("mode"));
        assert_eq!(image_meta.get("length").unwrap(), bytes.len());
    }
}
