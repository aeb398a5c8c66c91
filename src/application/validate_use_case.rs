// ============================================================
// Layer 2 — ValidateUseCase
// ============================================================
// Scores milestone checkpoints on a labelled split:
//
//   Step 1: Index {data_dir}/{split}         (Layer 4 - data)
//   Step 2: Rebuild the trained architecture (Layer 6 - infra)
//   Step 3: Scan the requested epochs        (Layer 5 - ml)

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::{
    default_weights_path, resolve_model_config, DEFAULT_RUN_NAME,
};
use crate::data::dataset::{LabelledImageDataset, DEFAULT_IMAGE_SIZE};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    backbone::BackboneKind,
    evaluator::{run_evaluation, EvalReport},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateConfig {
    pub run_name:     String,
    pub weights_path: PathBuf,
    pub data_dir:     PathBuf,
    pub split:        String,
    /// Milestone epochs to score, in order
    pub epochs:       Vec<usize>,
    pub backbone:     BackboneKind,
    pub lite_filters: usize,
    pub image_size:   usize,
    pub num_workers:  usize,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            run_name:     DEFAULT_RUN_NAME.to_string(),
            weights_path: default_weights_path(DEFAULT_RUN_NAME),
            data_dir:     PathBuf::from("data"),
            split:        "val".to_string(),
            epochs:       vec![25],
            backbone:     BackboneKind::Resnet18,
            lite_filters: 16,
            image_size:   DEFAULT_IMAGE_SIZE,
            num_workers:  4,
        }
    }
}

pub struct ValidateUseCase {
    config: ValidateConfig,
}

impl ValidateUseCase {
    pub fn new(config: ValidateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let cfg = &self.config;

        let dataset = LabelledImageDataset::from_split(&cfg.data_dir, &cfg.split, cfg.image_size)
            .with_context(|| format!("Cannot read '{}' split under '{}'", cfg.split, cfg.data_dir.display()))?;

        let ckpt_manager = CheckpointManager::new(cfg.weights_path.clone());
        let model_cfg    = resolve_model_config(&ckpt_manager, cfg.backbone, cfg.lite_filters)?;

        run_evaluation(
            &cfg.epochs,
            &model_cfg,
            Arc::new(dataset),
            &ckpt_manager,
            cfg.image_size,
            cfg.num_workers,
        )
    }
}
