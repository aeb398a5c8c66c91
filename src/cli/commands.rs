// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and their flags:
//
//   train       — train / resume on {data_dir}/train
//   val         — score milestones on {data_dir}/{split}
//   test        — predict one folder of images
//   preprocess  — predict every category of a brand
//
// Flags shared by all four (run name, weights, backbone, image
// size, workers) live in `ModelArgs` and are flattened in.
// Pretrained backbone weights only matter to `train`.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::{
    predict_use_case::{PredictConfig, PreprocessConfig, DEFAULT_EPOCH},
    train_use_case::{default_weights_path, TrainConfig, DEFAULT_RUN_NAME},
    validate_use_case::ValidateConfig,
};
use crate::data::dataset::DEFAULT_IMAGE_SIZE;
use crate::ml::backbone::BackboneKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the sleeve classifier, resuming from the latest checkpoint
    Train(TrainArgs),

    /// Report accuracy of milestone checkpoints on a labelled split
    Val(ValArgs),

    /// Write predictions for a folder of product images
    Test(TestArgs),

    /// Run `test` over every category folder of a brand
    Preprocess(PreprocessArgs),
}

/// Flags every subcommand understands.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Name of the run; picks the default weights file and loss log folder
    #[arg(long, default_value = DEFAULT_RUN_NAME)]
    pub run_name: String,

    /// Latest-checkpoint path [default: weights/{run_name}.ckpt]
    #[arg(long)]
    pub weights_path: Option<PathBuf>,

    /// Feature extractor architecture
    #[arg(long, value_enum, default_value_t = BackboneKind::Resnet18)]
    pub backbone: BackboneKind,

    /// First block width of the lite backbone
    #[arg(long, default_value_t = 16)]
    pub lite_filters: usize,

    /// Images are resized to image_size × image_size
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE)]
    pub image_size: usize,

    /// Image decoding threads
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,
}

impl ModelArgs {
    pub fn weights_path(&self) -> PathBuf {
        self.weights_path
            .clone()
            .unwrap_or_else(|| default_weights_path(&self.run_name))
    }
}

// ─── train ────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Dataset root containing train/{sleeve,sleeveless}
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Total number of epochs (a resumed run continues up to this)
    #[arg(long, default_value_t = 50)]
    pub n_epochs: usize,

    /// Images per training step (at least 1)
    #[arg(
        long,
        default_value_t = 32,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub batch_size: usize,

    /// Adam learning rate at the start of the cosine schedule
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Epochs from the base learning rate to eta_min
    #[arg(long, default_value_t = 50)]
    pub t_max: usize,

    #[arg(long, default_value_t = 1e-6)]
    pub eta_min: f64,

    /// Save a milestone checkpoint every N epochs
    #[arg(long, default_value_t = 5)]
    pub milestone_every: usize,

    /// Pretrained backbone record (Burn binary format)
    #[arg(long)]
    pub backbone_weights: Option<PathBuf>,

    /// Shuffle seed; epoch e uses seed + e
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Train the head only
    #[arg(long)]
    pub freeze_backbone: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            weights_path:     a.model.weights_path(),
            run_name:         a.model.run_name,
            data_dir:         a.data_dir,
            backbone:         a.model.backbone,
            backbone_weights: a.backbone_weights,
            lite_filters:     a.model.lite_filters,
            image_size:       a.model.image_size,
            num_workers:      a.model.num_workers,
            n_epochs:         a.n_epochs,
            batch_size:       a.batch_size,
            lr:               a.lr,
            t_max:            a.t_max,
            eta_min:          a.eta_min,
            milestone_every:  a.milestone_every,
            seed:             a.seed,
            freeze_backbone:  a.freeze_backbone,
        }
    }
}

// ─── val ──────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ValArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Split folder under data_dir
    #[arg(long, default_value = "val")]
    pub split: String,

    /// Milestone epochs to score, comma separated
    #[arg(long, value_delimiter = ',', default_value = "25")]
    pub epochs: Vec<usize>,
}

impl From<ValArgs> for ValidateConfig {
    fn from(a: ValArgs) -> Self {
        ValidateConfig {
            weights_path: a.model.weights_path(),
            run_name:     a.model.run_name,
            data_dir:     a.data_dir,
            split:        a.split,
            epochs:       a.epochs,
            backbone:     a.model.backbone,
            lite_filters: a.model.lite_filters,
            image_size:   a.model.image_size,
            num_workers:  a.model.num_workers,
        }
    }
}

// ─── test ─────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TestArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Folder of product images
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Folder for {identifier}.json records (created if missing)
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Milestone epoch to load
    #[arg(long, default_value_t = DEFAULT_EPOCH)]
    pub epoch: usize,
}

impl ModelArgs {
    fn predict_config(self, input_dir: PathBuf, output_dir: PathBuf, epoch: usize) -> PredictConfig {
        PredictConfig {
            weights_path: self.weights_path(),
            run_name:     self.run_name,
            input_dir,
            output_dir,
            epoch,
            backbone:     self.backbone,
            lite_filters: self.lite_filters,
            image_size:   self.image_size,
            num_workers:  self.num_workers,
        }
    }
}

impl From<TestArgs> for PredictConfig {
    fn from(a: TestArgs) -> Self {
        a.model.predict_config(a.input_dir, a.output_dir, a.epoch)
    }
}

// ─── preprocess ───────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PreprocessArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Root holding parse_filtered_Data/{brand}
    #[arg(long, default_value = "Data")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub brand: String,

    /// A single category; all categories when omitted
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, default_value_t = DEFAULT_EPOCH)]
    pub epoch: usize,
}

impl From<PreprocessArgs> for PreprocessConfig {
    fn from(a: PreprocessArgs) -> Self {
        PreprocessConfig {
            data_root: a.data_root,
            brand:     a.brand,
            category:  a.category,
            // Per-category folders are filled in by the use case
            predict:   a.model.predict_config(PathBuf::new(), PathBuf::new(), a.epoch),
        }
    }
}
