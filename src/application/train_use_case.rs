// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Index the labelled train split   (Layer 4 - data)
//   Step 2: Save config next to the weights  (Layer 6 - infra)
//   Step 3: Open the loss CSV for this run   (Layer 6 - infra)
//   Step 4: Run (or resume) the epoch loop   (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::dataset::{LabelledImageDataset, DEFAULT_IMAGE_SIZE};
use crate::infra::{checkpoint::CheckpointManager, metrics::LossLogger};
use crate::ml::{
    backbone::BackboneKind,
    model::SleeveClassifierConfig,
    trainer::{run_training, TrainOutcome},
};

pub const DEFAULT_RUN_NAME: &str = "sleeve_clf_Adam";

/// Split folder used for training
pub const TRAIN_SPLIT: &str = "train";

/// `weights/{run_name}.ckpt`
pub fn default_weights_path(run_name: &str) -> PathBuf {
    Path::new("weights").join(format!("{run_name}.ckpt"))
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it can be saved next to the weights and reloaded
// by `val` / `test` to rebuild the same architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub run_name:         String,
    pub weights_path:     PathBuf,
    pub data_dir:         PathBuf,
    pub backbone:         BackboneKind,
    pub backbone_weights: Option<PathBuf>,
    pub lite_filters:     usize,
    pub image_size:       usize,
    pub num_workers:      usize,
    pub n_epochs:         usize,
    pub batch_size:       usize,
    pub lr:               f64,
    pub t_max:            usize,
    pub eta_min:          f64,
    pub milestone_every:  usize,
    pub seed:             u64,
    pub freeze_backbone:  bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            run_name:         DEFAULT_RUN_NAME.to_string(),
            weights_path:     default_weights_path(DEFAULT_RUN_NAME),
            data_dir:         PathBuf::from("data"),
            backbone:         BackboneKind::Resnet18,
            backbone_weights: None,
            lite_filters:     16,
            image_size:       DEFAULT_IMAGE_SIZE,
            num_workers:      4,
            n_epochs:         50,
            batch_size:       32,
            lr:               1e-4,
            t_max:            50,
            eta_min:          1e-6,
            milestone_every:  5,
            seed:             42,
            freeze_backbone:  false,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self) -> SleeveClassifierConfig {
        SleeveClassifierConfig::new(self.backbone).with_lite_filters(self.lite_filters)
    }
}

/// The architecture a run was trained with, falling back to the
/// given flags when no config was saved.
pub fn resolve_model_config(
    ckpt_manager: &CheckpointManager,
    backbone:     BackboneKind,
    lite_filters: usize,
) -> Result<SleeveClassifierConfig> {
    match ckpt_manager.load_config()? {
        Some(saved) => {
            tracing::info!(
                "Using {:?} backbone from '{}'",
                saved.backbone,
                ckpt_manager.config_path().display()
            );
            Ok(saved.model_config())
        }
        None => {
            tracing::info!("No saved config; using {:?} backbone from flags", backbone);
            Ok(SleeveClassifierConfig::new(backbone).with_lite_filters(lite_filters))
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainOutcome> {
        let cfg = &self.config;
        ensure!(cfg.batch_size > 0, "batch_size must be at least 1");

        // ── Step 1: Index training images ─────────────────────────────────────
        let dataset = LabelledImageDataset::from_split(&cfg.data_dir, TRAIN_SPLIT, cfg.image_size)
            .with_context(|| format!("Cannot read training data under '{}'", cfg.data_dir.display()))?;

        // ── Step 2: Save config for val / test ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(cfg.weights_path.clone());
        ckpt_manager.save_config(cfg)?;

        // ── Step 3: Loss time series ──────────────────────────────────────────
        let loss_logger = LossLogger::for_run(&cfg.run_name)?;
        tracing::info!("Logging batch loss to '{}'", loss_logger.csv_path().display());

        // ── Step 4: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, Arc::new(dataset), &ckpt_manager, &loss_logger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_path_follows_run_name() {
        assert_eq!(default_weights_path("exp1"), PathBuf::from("weights/exp1.ckpt"));
        assert_eq!(TrainConfig::default().weights_path, PathBuf::from("weights/sleeve_clf_Adam.ckpt"));
    }

    #[test]
    fn saved_config_wins_over_flags() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("run.ckpt"));

        let fallback = resolve_model_config(&manager, BackboneKind::Resnet18, 16).unwrap();
        assert_eq!(fallback.backbone, BackboneKind::Resnet18);

        let trained = TrainConfig { backbone: BackboneKind::Lite, lite_filters: 4, ..TrainConfig::default() };
        manager.save_config(&trained).unwrap();

        let resolved = resolve_model_config(&manager, BackboneKind::Resnet18, 16).unwrap();
        assert_eq!(resolved.backbone, BackboneKind::Lite);
        assert_eq!(resolved.lite_filters, 4);
    }

    #[test]
    fn zero_batch_size_is_refused_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            batch_size:   0,
            data_dir:     dir.path().to_path_buf(),
            weights_path: dir.path().join("run.ckpt"),
            ..TrainConfig::default()
        };

        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
        assert!(!dir.path().join("run.config.json").exists());
    }
}
