//! `auto_orient` transform — applies the source image's Exif orientation
//! tag so downstream transforms operate on correctly-oriented pixels.
//!
//! No settings. Intermediate (never `final`).

use async_trait::async_trait;
use serde_json::Value;

use super::decode_if_empty;
use crate::registry::analyzer::CapabilityError;
use crate::registry::schema::SettingsSchema;
use crate::registry::transform::{FrameState, Transform, TransformContext};

pub struct AutoOrientTransform;

#[async_trait]
impl Transform for AutoOrientTransform {
    fn name(&self) -> &'static str {
        "auto_orient"
    }

    fn schema(&self) -> SettingsSchema {
        SettingsSchema::default()
    }

    fn is_final(&self) -> bool {
        false
    }

    async fn apply(
        &self,
        _settings: &Value,
        ctx: &mut TransformContext<'_>,
    ) -> Result<(), CapabilityError> {
        decode_if_empty(&mut ctx.state, ctx.original_blob)?;
        let orientation = exif_orientation(ctx.original_blob);

        if let FrameState::Frames { frames, .. } = &mut ctx.state {
            for frame in frames.iter_mut() {
                apply_orientation(frame, orientation);
            }
        }
        ctx.history.push(self.name().to_string());
        Ok(())
    }
}

/// Read the Exif `Orientation` tag (APP1 segment, tag 0x0112) from a JPEG
/// byte stream. Returns `1` (identity) for anything else, including
/// non-JPEG formats and images without Exif data.
fn exif_orientation(blob: &[u8]) -> u16 {
    if blob.len() < 4 || blob[0] != 0xFF || blob[1] != 0xD8 {
        return 1;
    }
    let mut offset = 2;
    while offset + 4 <= blob.len() {
        if blob[offset] != 0xFF {
            break;
        }
        let marker = blob[offset + 1];
        let segment_len = u16::from_be_bytes([blob[offset + 2], blob[offset + 3]]) as usize;
        if marker == 0xE1 {
            let segment_start = offset + 4;
            if let Some(segment) = blob.get(segment_start..offset + 2 + segment_len) {
                if let Some(orientation) = parse_exif_orientation(segment) {
                    return orientation;
                }
            }
        }
        offset += 2 + segment_len;
    }
    1
}

fn parse_exif_orientation(segment: &[u8]) -> Option<u16> {
    if !segment.starts_with(b"Exif\0\0") {
        return None;
    }
    let tiff = &segment[6..];
    let little_endian = tiff.get(0..2)? == b"II";
    let read_u16 = |buf: &[u8]| -> u16 {
        if little_endian {
            u16::from_le_bytes([buf[0], buf[1]])
        } else {
            u16::from_be_bytes([buf[0], buf[1]])
        }
    };
    let read_u32 = |buf: &[u8]| -> u32 {
        if little_endian {
            u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
        } else {
            u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
        }
    };
    let ifd_offset = read_u32(tiff.get(4..8)?) as usize;
    let entry_count = read_u16(tiff.get(ifd_offset..ifd_offset + 2)?);
    for i in 0..entry_count as usize {
        let entry_start = ifd_offset + 2 + i * 12;
        let entry = tiff.get(entry_start..entry_start + 12)?;
        let tag = read_u16(&entry[0..2]);
        if tag == 0x0112 {
            return Some(read_u16(&entry[8..10]));
        }
    }
    None
}

fn apply_orientation(frame: &mut image::DynamicImage, orientation: u16) {
    *frame = match orientation {
        2 => frame.fliph(),
        3 => frame.rotate180(),
        4 => frame.flipv(),
        5 => frame.rotate90().fliph(),
        6 => frame.rotate90(),
        7 => frame.rotate270().fliph(),
        8 => frame.rotate270(),
        _ => return,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_jpeg_input_reports_identity_orientation() {
        assert_eq!(exif_orientation(b"not a jpeg"), 1);
    }
}
