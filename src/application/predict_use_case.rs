// ============================================================
// Layer 2 — PredictUseCase / PreprocessUseCase
// ============================================================
// `test`:       one input folder → one output folder of
//               per-product JSON records.
//
// `preprocess`: the same for every category of a brand:
//
//   {data_root}/parse_filtered_Data/{brand}/
//     {category}/product/*.jpg        ← input
//     {category}/product_info/*.json  ← output (merged)
//
// Categories run in sorted order; one missing milestone stops
// the whole batch. A category without a product folder is
// skipped with a warning.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::{
    default_weights_path, resolve_model_config, DEFAULT_RUN_NAME,
};
use crate::data::dataset::{NamedImageDataset, DEFAULT_IMAGE_SIZE};
use crate::infra::{checkpoint::CheckpointManager, result_store::JsonResultStore};
use crate::ml::{backbone::BackboneKind, inferencer::run_inference};

/// Default milestone used for inference
pub const DEFAULT_EPOCH: usize = 25;

const BRANDS_DIR:       &str = "parse_filtered_Data";
const PRODUCT_DIR:      &str = "product";
const PRODUCT_INFO_DIR: &str = "product_info";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictConfig {
    pub run_name:     String,
    pub weights_path: PathBuf,
    pub input_dir:    PathBuf,
    pub output_dir:   PathBuf,
    pub epoch:        usize,
    pub backbone:     BackboneKind,
    pub lite_filters: usize,
    pub image_size:   usize,
    pub num_workers:  usize,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            run_name:     DEFAULT_RUN_NAME.to_string(),
            weights_path: default_weights_path(DEFAULT_RUN_NAME),
            input_dir:    PathBuf::from("input"),
            output_dir:   PathBuf::from("output"),
            epoch:        DEFAULT_EPOCH,
            backbone:     BackboneKind::Resnet18,
            lite_filters: 16,
            image_size:   DEFAULT_IMAGE_SIZE,
            num_workers:  4,
        }
    }
}

pub struct PredictUseCase {
    config: PredictConfig,
}

impl PredictUseCase {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    /// Returns the number of records written.
    pub fn execute(&self) -> Result<usize> {
        let cfg = &self.config;

        let dataset = NamedImageDataset::from_dir(&cfg.input_dir, cfg.image_size)
            .with_context(|| format!("Cannot read images from '{}'", cfg.input_dir.display()))?;
        let store = JsonResultStore::new(cfg.output_dir.clone())?;

        let ckpt_manager = CheckpointManager::new(cfg.weights_path.clone());
        let model_cfg    = resolve_model_config(&ckpt_manager, cfg.backbone, cfg.lite_filters)?;

        run_inference(
            cfg.epoch,
            &model_cfg,
            Arc::new(dataset),
            &ckpt_manager,
            &store,
            cfg.image_size,
            cfg.num_workers,
        )
    }
}

// ─── Preprocess ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    pub data_root: PathBuf,
    pub brand:     String,
    /// Only this category; every category when `None`
    pub category:  Option<String>,
    /// Everything except the input/output folders
    pub predict:   PredictConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("Data"),
            brand:     String::new(),
            category:  None,
            predict:   PredictConfig::default(),
        }
    }
}

/// Category folder names under `brand_dir`, sorted.
pub fn discover_categories(brand_dir: &Path, only: Option<&str>) -> Result<Vec<String>> {
    if let Some(category) = only {
        return Ok(vec![category.to_string()]);
    }
    if !brand_dir.is_dir() {
        bail!("Brand folder '{}' does not exist", brand_dir.display());
    }

    let mut categories: Vec<String> = fs::read_dir(brand_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    categories.sort();
    Ok(categories)
}

pub struct PreprocessUseCase {
    config: PreprocessConfig,
}

impl PreprocessUseCase {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn brand_dir(&self) -> PathBuf {
        self.config.data_root.join(BRANDS_DIR).join(&self.config.brand)
    }

    /// Returns the total number of records written.
    pub fn execute(&self) -> Result<usize> {
        let started   = Instant::now();
        let brand_dir = self.brand_dir();
        let mut total = 0usize;

        for category in discover_categories(&brand_dir, self.config.category.as_deref())? {
            let category_dir = brand_dir.join(&category);
            let product_dir  = category_dir.join(PRODUCT_DIR);
            if !product_dir.is_dir() {
                tracing::warn!("Skipping category '{}': no '{}' folder", category, PRODUCT_DIR);
                continue;
            }
            tracing::info!("Category '{}'", category);

            let cfg = PredictConfig {
                input_dir:  product_dir,
                output_dir: category_dir.join(PRODUCT_INFO_DIR),
                ..self.config.predict.clone()
            };
            total += PredictUseCase::new(cfg)
                .execute()
                .with_context(|| format!("Category '{category}' failed"))?;
        }

        tracing::info!(
            "Product classification time {:.4} s",
            started.elapsed().as_secs_f64()
        );
        Ok(total)
    }
}
