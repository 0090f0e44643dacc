//! Name normalization for store keys.
//!
//! Grounded on the two distinct slug alphabets in
//! `original_source/api/assets/collection.py` (`ALLOWED_SLUGIFY_CHARACTERS
//! = re.compile(r'[^-a-z0-9/]+')`, used for asset names) and
//! `original_source/api/assets/variations/collection.py` (`r'[^-_a-z0-9]+'`,
//! used for variation names) — variation names additionally allow `_` but
//! not `/`, since they never nest into a path.

use std::sync::OnceLock;

use regex::Regex;

fn asset_name_disallowed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^-a-z0-9/]+").expect("valid regex"))
}

fn variation_name_disallowed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^-_a-z0-9]+").expect("valid regex"))
}

/// Normalize an asset name: lowercase, collapse any run of disallowed
/// characters to a single `-`, trim leading/trailing `-`.
pub fn slugify_asset_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    asset_name_disallowed()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Normalize a variation name using the stricter (no `/`) alphabet.
pub fn slugify_variation_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    variation_name_disallowed()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_name_collapses_spaces_and_punctuation() {
        assert_eq!(slugify_asset_name("My Photo!!.png"), "my-photo-png");
    }

    #[test]
    fn asset_name_preserves_path_separators() {
        assert_eq!(slugify_asset_name("campaigns/Summer 2026"), "campaigns/summer-2026");
    }

    #[test]
    fn variation_name_rejects_path_separators() {
        assert_eq!(slugify_variation_name("thumb/small"), "thumb-small");
    }

    #[test]
    fn variation_name_keeps_underscores() {
        assert_eq!(slugify_variation_name("Thumb_Small"), "thumb_small");
    }
}
