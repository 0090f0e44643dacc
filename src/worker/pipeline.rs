//! The analyzer and transform pipelines a claimed task runs through, plus
//! the `_store_variation` contract a `final` transform's output triggers.

use std::sync::Arc;

use bytes::Bytes;

use crate::accounts::{AssetRepository, AssetRepositoryError, StatsSink};
use crate::domain::stats::StatName;
use crate::domain::{next_version, AnalyzeStep, Asset, TransformStep, Variation};
use crate::registry::{AnalyzerRegistry, CapabilityError, Transform, TransformContext, TransformRegistry};
use crate::storage::{BlobBackend, BlobError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown analyzer: {0}")]
    UnknownAnalyzer(String),
    #[error("unknown transform: {0}")]
    UnknownTransform(String),
    #[error("exactly one final transform is required, as the last step")]
    MalformedTransformList,
    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),
    #[error("blob storage error: {0}")]
    Storage(#[from] BlobError),
    #[error("asset repository error: {0}")]
    Repository(#[from] AssetRepositoryError),
    #[error("no backend configured for this asset's security class")]
    NoBackendConfigured,
}

/// Run every analyzer step in order against a loaded asset and its blob.
/// Each analyzer writes into `asset.meta` directly and `asset.touch()` is
/// called after every successful step, mirroring the `$set` plus
/// `modified` bump the original does per analyzer.
pub async fn run_analyze_pipeline(
    asset: &mut Asset,
    blob: &[u8],
    steps: &[AnalyzeStep],
    registry: &AnalyzerRegistry,
) -> Result<(), PipelineError> {
    let mut history = Vec::with_capacity(steps.len());
    for step in steps {
        let analyzer = registry
            .get(asset.asset_type, &step.analyzer_name)
            .ok_or_else(|| PipelineError::UnknownAnalyzer(step.analyzer_name.clone()))?;
        analyzer
            .analyze(&step.settings, asset, blob, &history)
            .await?;
        asset.touch();
        history.push(step.analyzer_name.clone());
    }
    Ok(())
}

/// Run every transform step against a fresh [`TransformContext`], returning
/// it once exhausted. The caller inspects `ctx.state` — it is guaranteed to
/// be `FrameState::Encoded` on success, since validation below requires the
/// last step to be the pipeline's one `final` transform.
pub async fn run_transform_pipeline<'a>(
    mut ctx: TransformContext<'a>,
    steps: &[TransformStep],
    registry: &TransformRegistry,
) -> Result<TransformContext<'a>, PipelineError> {
    let mut resolved: Vec<(Arc<dyn Transform>, &TransformStep)> = Vec::with_capacity(steps.len());
    for step in steps {
        let transform = registry
            .get(ctx.asset.asset_type, &step.transform_name)
            .ok_or_else(|| PipelineError::UnknownTransform(step.transform_name.clone()))?;
        resolved.push((transform, step));
    }

    let final_count = resolved.iter().filter(|(t, _)| t.is_final()).count();
    let last_is_final = resolved.last().map(|(t, _)| t.is_final()).unwrap_or(false);
    if resolved.is_empty() || final_count != 1 || !last_is_final {
        return Err(PipelineError::MalformedTransformList);
    }

    for (transform, step) in resolved {
        transform.apply(&step.settings, &mut ctx).await?;
    }

    if !ctx.state.is_encoded() {
        return Err(PipelineError::MalformedTransformList);
    }
    Ok(ctx)
}

/// The `_store_variation` contract (spec §4.9): write the encoded blob,
/// atomically update the asset's variation map, clean up a superseded
/// blob, and account for the size/count delta in stats.
pub async fn store_variation(
    asset_repo: &dyn AssetRepository,
    stats: &dyn StatsSink,
    backend: Arc<dyn BlobBackend>,
    asset: &mut Asset,
    variation_name: &str,
    content_type: String,
    ext: String,
    data: Vec<u8>,
    versioned: bool,
) -> Result<(), PipelineError> {
    let previous = asset.variations.get(variation_name).cloned();
    let previous_key = previous
        .as_ref()
        .map(|v| v.store_key(&asset.name, &asset.uid, variation_name));

    let version = if versioned {
        Some(next_version(previous.as_ref().and_then(|v| v.version.as_deref())))
    } else {
        None
    };
    let new_len = data.len() as i64;
    let mut meta = std::collections::HashMap::new();
    meta.insert("length".to_string(), serde_json::json!(new_len));
    let new_variation = Variation {
        content_type,
        ext,
        meta,
        version,
    };
    let new_key = new_variation.store_key(&asset.name, &asset.uid, variation_name);

    backend.store(&new_key, Bytes::from(data)).await?;

    asset
        .variations
        .insert(variation_name.to_string(), new_variation);
    asset.touch();
    asset_repo.put(asset.clone()).await?;

    if let Some(old_key) = previous_key {
        if old_key != new_key {
            backend.delete(&old_key).await?;
        }
    }

    let is_replacement = previous.is_some();
    crate::accounts::stats::record(
        stats,
        asset.account_id,
        StatName::Variations,
        if is_replacement { 0 } else { 1 },
        asset.modified,
    )
    .await;
    let old_len = previous
        .as_ref()
        .and_then(|v| v.meta.get("length"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    crate::accounts::stats::record(
        stats,
        asset.account_id,
        StatName::Length,
        new_len - old_len,
        asset.modified,
    )
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{InMemoryAssetRepository, InMemoryStatsSink};
    use crate::domain::stats::inc_keys;
    use crate::registry::{build_default_analyzer_registry, build_default_transform_registry};
    use crate::registry::FrameState;
    use crate::storage::LocalBlobBackend;
    use serde_json::json;
    use uuid::Uuid;

    fn solid_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn analyze_pipeline_runs_registered_analyzers_in_order() {
        let mut asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = solid_png(8, 8);
        let registry = build_default_analyzer_registry();
        let steps = vec![
            AnalyzeStep {
                analyzer_name: "dominant_colors".to_string(),
                settings: json!({}),
            },
            AnalyzeStep {
                analyzer_name: "focal_point".to_string(),
                settings: json!({}),
            },
        ];
        run_analyze_pipeline(&mut asset, &blob, &steps, &registry)
            .await
            .unwrap();

        let image_meta = asset.meta.get("image").unwrap();
        assert!(image_meta.get("dominant_colors").is_some());
        assert!(image_meta.get("focal_point").is_some());
    }

    #[tokio::test]
    async fn analyze_pipeline_rejects_unknown_analyzer() {
        let mut asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = solid_png(4, 4);
        let registry = build_default_analyzer_registry();
        let steps = vec![AnalyzeStep {
            analyzer_name: "not_a_real_analyzer".to_string(),
            settings: json!({}),
        }];
        let err = run_analyze_pipeline(&mut asset, &blob, &steps, &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownAnalyzer(_)));
    }

    #[tokio::test]
    async fn transform_pipeline_rejects_final_not_last() {
        let asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = solid_png(10, 10);
        let registry = build_default_transform_registry();
        let ctx = TransformContext {
            asset: &asset,
            original_blob: &blob,
            variation_name: "thumb",
            state: FrameState::Empty,
            history: vec![],
        };
        let steps = vec![
            TransformStep {
                transform_name: "output".to_string(),
                settings: json!({"image_format": "PNG"}),
            },
            TransformStep {
                transform_name: "rotate".to_string(),
                settings: json!({"degrees": "90"}),
            },
        ];
        let err = run_transform_pipeline(ctx, &steps, &registry).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTransformList));
    }

    #[tokio::test]
    async fn transform_pipeline_encodes_via_final_step() {
        let asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = solid_png(20, 20);
        let registry = build_default_transform_registry();
        let ctx = TransformContext {
            asset: &asset,
            original_blob: &blob,
            variation_name: "thumb",
            state: FrameState::Empty,
            history: vec![],
        };
        let steps = vec![
            TransformStep {
                transform_name: "rotate".to_string(),
                settings: json!({"degrees": "90"}),
            },
            TransformStep {
                transform_name: "output".to_string(),
                settings: json!({"image_format": "PNG"}),
            },
        ];
        let ctx = run_transform_pipeline(ctx, &steps, &registry).await.unwrap();
        assert!(ctx.state.is_encoded());
    }

    #[tokio::test]
    async fn store_variation_versions_and_cleans_up_old_blob() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn BlobBackend> = Arc::new(LocalBlobBackend::new(dir.path().to_path_buf()));
        let asset_repo = InMemoryAssetRepository::new();
        let stats = InMemoryStatsSink::new();

        let mut asset = Asset::new(
            Uuid::new_v4(),
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        asset_repo.put(asset.clone()).await.unwrap();

        store_variation(
            &asset_repo,
            &stats,
            backend.clone(),
            &mut asset,
            "thumb",
            "image/png".to_string(),
            "png".to_string(),
            vec![0u8; 100],
            true,
        )
        .await
        .unwrap();
        let first_key = asset.variations["thumb"].store_key(&asset.name, &asset.uid, "thumb");
        assert!(backend.retrieve(&first_key).await.is_ok());

        store_variation(
            &asset_repo,
            &stats,
            backend.clone(),
            &mut asset,
            "thumb",
            "image/png".to_string(),
            "png".to_string(),
            vec![0u8; 40],
            true,
        )
        .await
        .unwrap();
        let second_key = asset.variations["thumb"].store_key(&asset.name, &asset.uid, "thumb");

        assert_ne!(first_key, second_key);
        assert!(backend.retrieve(&first_key).await.is_err());
        assert!(backend.retrieve(&second_key).await.is_ok());

        let length_key = &inc_keys(&asset.account_id.to_string(), StatName::Length, asset.modified)[0];
        assert_eq!(stats.get(length_key), 40);
        let variations_key =
            &inc_keys(&asset.account_id.to_string(), StatName::Variations, asset.modified)[0];
        assert_eq!(stats.get(variations_key), 1);
    }
}
