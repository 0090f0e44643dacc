//! The analyzer/transform capability registry.
//!
//! Two flat, immutable-after-startup maps keyed by `(asset_type, name)`.
//! Populated by an explicit `build_default_registry` call at startup from a
//! table of factory constructors — no ctor-registration/metaclass tricks,
//! per the redesign notes (the source used import-time metaclass
//! registration).

pub mod analyzer;
pub mod image;
pub mod schema;
pub mod transform;

use std::collections::HashMap;
use std::sync::Arc;

pub use analyzer::{Analyzer, CapabilityError};
pub use transform::{FrameState, Transform, TransformContext};

use crate::domain::AssetType;

/// Lookup of registered analyzers, keyed by `(asset_type, name)`, with a
/// fallback to `(AssetType::File, name)` when no type-specific analyzer is
/// registered.
#[derive(Default)]
pub struct AnalyzerRegistry {
    entries: HashMap<(AssetType, &'static str), Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn register(&mut self, asset_type: AssetType, analyzer: Arc<dyn Analyzer>) {
        self.entries.insert((asset_type, analyzer.name()), analyzer);
    }

    /// Look up an analyzer by `(asset_type, name)`, falling back to the
    /// generic `file` asset type when no type-specific entry exists.
    pub fn get(&self, asset_type: AssetType, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.entries
            .get(&(asset_type, name))
            .or_else(|| self.entries.get(&(AssetType::File, name)))
            .cloned()
    }
}

/// Lookup of registered transforms, keyed by `(asset_type, name)`. Unlike
/// analyzers, there is no fallback to the `file` asset type.
#[derive(Default)]
pub struct TransformRegistry {
    entries: HashMap<(AssetType, &'static str), Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn register(&mut self, asset_type: AssetType, transform: Arc<dyn Transform>) {
        self.entries
            .insert((asset_type, transform.name()), transform);
    }

    pub fn get(&self, asset_type: AssetType, name: &str) -> Option<Arc<dyn Transform>> {
        self.entries.get(&(asset_type, name)).cloned()
    }
}

/// Build the process-wide analyzer registry with every capability this
/// crate implements.
pub fn build_default_analyzer_registry() -> AnalyzerRegistry {
    let mut registry = AnalyzerRegistry::default();
    registry.register(AssetType::Image, Arc::new(image::dominant_colors::DominantColorsAnalyzer));
    registry.register(AssetType::Image, Arc::new(image::animation::AnimationAnalyzer));
    registry.register(AssetType::Image, Arc::new(image::focal_point::FocalPointAnalyzer));
    registry
}

/// Build the process-wide transform registry with every capability this
/// crate implements.
pub fn build_default_transform_registry() -> TransformRegistry {
    let mut registry = TransformRegistry::default();
    registry.register(AssetType::Image, Arc::new(image::auto_orient::AutoOrientTransform));
    registry.register(AssetType::Image, Arc::new(image::crop::CropTransform));
    registry.register(AssetType::Image, Arc::new(image::fit::FitTransform));
    registry.register(
        AssetType::Image,
        Arc::new(image::focal_point_crop::FocalPointCropTransform),
    );
    registry.register(AssetType::Image, Arc::new(image::rotate::RotateTransform));
    registry.register(AssetType::Image, Arc::new(image::single_frame::SingleFrameTransform));
    registry.register(AssetType::Image, Arc::new(image::output::OutputTransform));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_lookup_falls_back_to_file_type() {
        let mut registry = AnalyzerRegistry::default();
        registry.register(AssetType::File, Arc::new(image::dominant_colors::DominantColorsAnalyzer));
        assert!(registry.get(AssetType::Audio, "dominant_colors").is_some());
    }

    #[test]
    fn transform_lookup_has_no_fallback() {
        let mut registry = TransformRegistry::default();
        registry.register(AssetType::File, Arc::new(image::crop::CropTransform));
        assert!(registry.get(AssetType::Image, "crop").is_none());
    }

    #[test]
    fn default_registries_contain_every_documented_capability() {
        let analyzers = build_default_analyzer_registry();
        for name in ["dominant_colors", "animation", "focal_point"] {
            assert!(analyzers.get(AssetType::Image, name).is_some(), "{name}");
        }

        let transforms = build_default_transform_registry();
        for name in [
            "auto_orient",
            "crop",
            "fit",
            "focal_point_crop",
            "rotate",
            "single_frame",
            "output",
        ] {
            assert!(transforms.get(AssetType::Image, name).is_some(), "{name}");
        }
        assert!(transforms.get(AssetType::Image, "output").unwrap().is_final());
    }
}
