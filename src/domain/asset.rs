//! Asset — a stored file plus derived metadata and variations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const UID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const UID_LENGTH: usize = 6;

/// Coarse classification of an asset's content, used to key the analyzer
/// and transform registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    File,
    Image,
    Audio,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    /// Derive an asset type from a MIME content type, falling back to the
    /// generic `file` type for anything unrecognized.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            Self::Image
        } else if content_type.starts_with("audio/") {
            Self::Audio
        } else {
            Self::File
        }
    }
}

/// A derived artefact of an asset, produced by a transform pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variation {
    pub content_type: String,
    pub ext: String,
    pub meta: HashMap<String, Value>,
    /// Present only for versioned variations.
    pub version: Option<String>,
}

impl Variation {
    /// Compute the store key for a variation blob, inserting the version
    /// segment immediately before the extension when present.
    pub fn store_key(&self, base_name: &str, uid: &str, variation_name: &str) -> String {
        match &self.version {
            Some(version) => format!(
                "{base_name}.{uid}.{variation_name}.{version}.{ext}",
                ext = self.ext
            ),
            None => format!(
                "{base_name}.{uid}.{variation_name}.{ext}",
                ext = self.ext
            ),
        }
    }
}

/// Advance a base-36, lowercase, zero-padded-to-3 version counter.
///
/// `next_version(None) == "001"`. The padding is a minimum width, not a hard
/// cap: `next_version(Some("zzz")) == "1000"`.
pub fn next_version(current: Option<&str>) -> String {
    let current_value = current
        .and_then(|v| u64::from_str_radix(v, 36).ok())
        .unwrap_or(0);
    to_base36_padded(current_value + 1, 3)
}

fn to_base36_padded(mut value: u64, min_width: usize) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".repeat(min_width.max(1));
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    while digits.len() < min_width {
        digits.push(b'0');
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ASCII")
}

/// A stored file plus derived metadata and variations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub account_id: Uuid,
    pub secure: bool,
    pub name: String,
    pub uid: String,
    pub ext: String,
    pub asset_type: AssetType,
    pub content_type: String,
    pub expires: Option<DateTime<Utc>>,
    pub meta: HashMap<String, Value>,
    pub variations: HashMap<String, Variation>,
    pub modified: DateTime<Utc>,
}

impl Asset {
    pub fn new(
        account_id: Uuid,
        secure: bool,
        name: String,
        ext: String,
        content_type: String,
    ) -> Self {
        let asset_type = AssetType::from_content_type(&content_type);
        Self {
            id: Uuid::new_v4(),
            account_id,
            secure,
            name,
            uid: generate_uid(),
            ext,
            asset_type,
            content_type,
            expires: None,
            meta: HashMap::new(),
            variations: HashMap::new(),
            modified: Utc::now(),
        }
    }

    /// Store key of the primary blob: `name.uid.ext`.
    pub fn store_key(&self) -> String {
        format!("{}.{}.{}", self.name, self.uid, self.ext)
    }

    /// An asset with `expires <= now` is logically absent from all API
    /// reads, even though its row has not yet been purged.
    pub fn is_expired(&self) -> bool {
        match self.expires {
            Some(expires) => expires <= Utc::now(),
            None => false,
        }
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// Generate a 6-character uid from the fixed 36-char lowercase alphanumeric
/// alphabet. Uniqueness is enforced per-account by the caller, not here.
pub fn generate_uid() -> String {
    let mut rng = rand::thread_rng();
    (0..UID_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..UID_CHARSET.len());
            UID_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_version_from_none_is_001() {
        assert_eq!(next_version(None), "001");
    }

    #[test]
    fn next_version_rolls_over_width() {
        assert_eq!(next_version(Some("zzz")), "1000");
    }

    #[test]
    fn next_version_is_monotone() {
        let mut current = None;
        let mut previous = String::new();
        for _ in 0..40 {
            let version = next_version(current.as_deref());
            if !previous.is_empty() {
                assert!(version.as_str() > previous.as_str());
            }
            previous = version.clone();
            current = Some(previous.clone());
        }
    }

    #[test]
    fn generated_uid_has_expected_shape() {
        let uid = generate_uid();
        assert_eq!(uid.len(), UID_LENGTH);
        assert!(uid.chars().all(|c| UID_CHARSET.contains(&(c as u8))));
    }

    #[test]
    fn store_key_joins_with_dot() {
        let asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        assert_eq!(asset.store_key(), format!("photo.{}.png", asset.uid));
    }

    #[test]
    fn variation_store_key_inserts_version_before_ext() {
        let variation = Variation {
            content_type: "image/jpeg".to_string(),
            ext: "jpg".to_string(),
            meta: HashMap::new(),
            version: Some("001".to_string()),
        };
        assert_eq!(
            variation.store_key("photo", "abc123", "thumb"),
            "photo.abc123.thumb.001.jpg"
        );
    }
}
