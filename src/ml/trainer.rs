// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop with Adam, cosine LR schedule and resumable
// checkpoints.
//
// Per epoch:
//   1. log the learning rate for this epoch
//   2. one pass over a freshly shuffled BatchStream
//      (seed + epoch, so resumed runs see the same order)
//   3. per batch: forward → cross-entropy → backward → Adam step
//   4. scheduler.step()
//   5. save "latest" with epoch = epoch_index + 1
//   6. every `milestone_every` epochs, also save a milestone
//
// Key Burn 0.20 insight:
//   - Training uses TrainBackend (Autodiff<Wgpu>) for gradients
//   - GradientsParams::from_grads consumes the gradients, so
//     nothing accumulates across batches
//   - optim.to_record() / load_record() carry the Adam moments
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batch_stream::BatchStream,
    batcher::ImageBatcher,
    dataset::{LabelledImage, TryDataset},
};
use crate::infra::{
    checkpoint::{encode_record, CheckpointBundle, CheckpointError, CheckpointManager},
    metrics::{global_step, LossLogger},
};
use crate::ml::{
    backbone::BackboneKind,
    model::SleeveClassifier,
    scheduler::CosineAnnealingLr,
    TrainBackend,
};

/// What a call to the training loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainOutcome {
    /// Epochs already completed when the loop started
    pub start_epoch: usize,
    /// Epoch counter stored in the final "latest" bundle
    pub final_epoch: usize,
    /// Epochs for which a milestone bundle was written
    pub milestones:  Vec<usize>,
}

pub fn run_training<D>(
    cfg:          &TrainConfig,
    dataset:      Arc<D>,
    ckpt_manager: &CheckpointManager,
    loss_logger:  &LossLogger,
) -> Result<TrainOutcome>
where
    D: TryDataset<LabelledImage> + 'static,
{
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<TrainBackend, D>(cfg, dataset, ckpt_manager, loss_logger, device)
}

pub fn train_loop<B, D>(
    cfg:          &TrainConfig,
    dataset:      Arc<D>,
    ckpt_manager: &CheckpointManager,
    loss_logger:  &LossLogger,
    device:       B::Device,
) -> Result<TrainOutcome>
where
    B: AutodiffBackend,
    D: TryDataset<LabelledImage> + 'static,
{
    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: SleeveClassifier<B> = cfg.model_config().init(&device);
    match &cfg.backbone_weights {
        Some(path) => model = model.with_pretrained_backbone(path, &device)?,
        None if cfg.backbone == BackboneKind::Resnet18 => {
            tracing::warn!("No --backbone-weights given; ResNet-18 starts from random weights");
        }
        None => {}
    }
    if cfg.freeze_backbone {
        model = model.freeze_backbone();
        tracing::info!("Backbone frozen; only the head is trained");
    }

    // ── Adam optimiser + cosine schedule ──────────────────────────────────────
    let mut optim     = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, SleeveClassifier<B>>();
    let mut scheduler = CosineAnnealingLr::new(cfg.lr, cfg.eta_min, cfg.t_max);
    let mut start_epoch = 0;

    // ── Resume ────────────────────────────────────────────────────────────────
    match ckpt_manager.load_latest()? {
        Some(bundle) => {
            model       = model.load_record(bundle.model_record::<B, _>(&device)?);
            optim       = optim.load_record(bundle.optimizer_record::<B, _>(&device)?);
            scheduler   = bundle.scheduler_state()?;
            start_epoch = bundle.epoch;
            tracing::info!(
                "Resumed from '{}' at epoch {}",
                ckpt_manager.latest_path().display(),
                start_epoch
            );
        }
        None => tracing::info!(
            "No checkpoint at '{}'; starting from epoch 0",
            ckpt_manager.latest_path().display()
        ),
    }

    let batcher = ImageBatcher::<B>::new(device.clone(), cfg.image_size);
    let mut milestones  = Vec::new();
    let mut final_epoch = start_epoch;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in start_epoch..cfg.n_epochs {
        let lr = scheduler.lr();
        tracing::info!("Epoch {:>3}/{} | lr={:.3e}", epoch + 1, cfg.n_epochs, lr);

        let started = Instant::now();
        let stream  = BatchStream::shuffled(
            dataset.clone(),
            cfg.batch_size,
            cfg.seed + epoch as u64,
            cfg.num_workers,
        );
        let steps    = stream.steps();
        let progress = progress_bar(steps, epoch + 1);

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for (batch_index, items) in stream.enumerate() {
            let batch = batcher.labelled(items?);

            let (loss, _) = model.forward_loss(batch.images, batch.labels);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);

            loss_logger.log(global_step(epoch, steps, batch_index), loss_val)?;
            loss_sum += loss_val;
            batches  += 1;

            progress.set_message(format!("loss={loss_val:.4}"));
            progress.inc(1);
        }
        progress.finish_and_clear();

        scheduler.step();

        // ── Checkpoint ────────────────────────────────────────────────────────
        final_epoch = epoch + 1;
        let bundle = capture(final_epoch, &model, &optim, &scheduler)?;
        ckpt_manager.save_latest(&bundle)
            .with_context(|| format!("Cannot save checkpoint for epoch {final_epoch}"))?;

        if cfg.milestone_every > 0 && final_epoch % cfg.milestone_every == 0 {
            let path = ckpt_manager.save_milestone(&bundle)?;
            milestones.push(final_epoch);
            tracing::info!("Milestone saved to '{}'", path.display());
        }

        let mean_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        tracing::info!(
            "Epoch {:>3}/{} | mean_loss={:.4} | {:.2} min | {}",
            final_epoch,
            cfg.n_epochs,
            mean_loss,
            started.elapsed().as_secs_f64() / 60.0,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        );
    }

    tracing::info!("Training complete at epoch {}", final_epoch);
    Ok(TrainOutcome { start_epoch, final_epoch, milestones })
}

/// Snapshot model, optimizer and schedule after `epoch` completed epochs.
fn capture<B, O>(
    epoch:     usize,
    model:     &SleeveClassifier<B>,
    optim:     &O,
    scheduler: &CosineAnnealingLr,
) -> Result<CheckpointBundle, CheckpointError>
where
    B: AutodiffBackend,
    O: Optimizer<SleeveClassifier<B>, B>,
{
    CheckpointBundle::new(
        epoch,
        encode_record::<B, _>(model.clone().into_record())?,
        encode_record::<B, _>(optim.to_record())?,
        scheduler,
    )
}

fn progress_bar(steps: usize, epoch: usize) -> ProgressBar {
    let bar = ProgressBar::new(steps as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_prefix(format!("epoch {epoch}"));
    bar
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataset::InMemDataset;

    type TestBackend = Autodiff<NdArray>;

    const IMAGE_SIZE: usize = 8;

    fn tiny_dataset(n: usize) -> Arc<InMemDataset<LabelledImage>> {
        let items = (0..n)
            .map(|i| LabelledImage {
                image: vec![(i % 2) as f32; 3 * IMAGE_SIZE * IMAGE_SIZE],
                label: i % 2,
            })
            .collect();
        Arc::new(InMemDataset::new(items))
    }

    fn tiny_config(dir: &std::path::Path, n_epochs: usize) -> TrainConfig {
        TrainConfig {
            weights_path: dir.join("weights").join("run.ckpt"),
            backbone:     BackboneKind::Lite,
            lite_filters: 2,
            image_size:   IMAGE_SIZE,
            num_workers:  1,
            n_epochs,
            batch_size:   2,
            t_max:        n_epochs,
            ..TrainConfig::default()
        }
    }

    fn train(cfg: &TrainConfig, dir: &std::path::Path) -> TrainOutcome {
        let manager = CheckpointManager::new(cfg.weights_path.clone());
        let logger  = LossLogger::new(dir.join("runs")).unwrap();
        train_loop::<TestBackend, _>(cfg, tiny_dataset(5), &manager, &logger, Default::default())
            .unwrap()
    }

    #[test]
    fn twelve_epochs_write_milestones_five_and_ten() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path(), 12);

        let outcome = train(&cfg, dir.path());

        assert_eq!(outcome, TrainOutcome { start_epoch: 0, final_epoch: 12, milestones: vec![5, 10] });

        let manager = CheckpointManager::new(cfg.weights_path.clone());
        assert_eq!(manager.load_latest().unwrap().unwrap().epoch, 12);
        assert_eq!(manager.load_milestone(5).unwrap().epoch, 5);
        assert_eq!(manager.load_milestone(10).unwrap().epoch, 10);
        assert!(!manager.milestone_path(12).exists());
        assert!(!manager.milestone_path(15).exists());
    }

    #[test]
    fn resumed_run_reaches_the_same_final_epoch() {
        let resumed_dir = tempfile::tempdir().unwrap();
        let straight_dir = tempfile::tempdir().unwrap();

        // 3 epochs, stop, then continue to 6
        let first = train(&tiny_config(resumed_dir.path(), 3), resumed_dir.path());
        assert_eq!(first.final_epoch, 3);
        let cfg     = tiny_config(resumed_dir.path(), 6);
        let resumed = train(&cfg, resumed_dir.path());

        let straight = train(&tiny_config(straight_dir.path(), 6), straight_dir.path());

        assert_eq!(resumed.start_epoch, 3);
        assert_eq!(resumed.final_epoch, straight.final_epoch);
        assert_eq!(resumed.milestones, vec![5]);

        let bundle = CheckpointManager::new(cfg.weights_path.clone()).load_latest().unwrap().unwrap();
        assert_eq!(bundle.scheduler_state().unwrap().last_epoch, 6);
    }

    /// Decode the optimizer section into `optim` and encode it again.
    fn reload_optimizer<O>(optim: O, bundle: &CheckpointBundle) -> Vec<u8>
    where
        O: Optimizer<SleeveClassifier<TestBackend>, TestBackend>,
    {
        let record = bundle.optimizer_record::<TestBackend, O::Record>(&Default::default()).unwrap();
        encode_record::<TestBackend, _>(optim.load_record(record).to_record()).unwrap()
    }

    #[test]
    fn bundle_carries_adam_moments() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path(), 1);
        train(&cfg, dir.path());

        let bundle = CheckpointManager::new(cfg.weights_path.clone()).load_latest().unwrap().unwrap();
        let fresh  = || AdamConfig::new().with_epsilon(1e-8).init::<TestBackend, SleeveClassifier<TestBackend>>();

        // An untouched optimizer has no per-parameter state
        let empty = encode_record::<TestBackend, _>(fresh().to_record()).unwrap();
        let saved = &bundle.optimizer.payload;
        assert!(saved.len() > 10 * empty.len(), "{} vs {}", saved.len(), empty.len());

        let reloaded = reload_optimizer(fresh(), &bundle);
        assert_eq!(reloaded.len(), saved.len());
    }

    #[test]
    fn finished_run_does_nothing_more() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path(), 2);
        train(&cfg, dir.path());

        let again = train(&cfg, dir.path());
        assert_eq!(again, TrainOutcome { start_epoch: 2, final_epoch: 2, milestones: vec![] });
    }

    #[test]
    fn every_batch_loss_is_logged_with_global_steps() {
        let dir = tempfile::tempdir().unwrap();
        train(&tiny_config(dir.path(), 2), dir.path());

        // 5 items, batch size 2 → 2 full batches per epoch
        let csv   = std::fs::read_to_string(dir.path().join("runs").join("loss.csv")).unwrap();
        let steps: Vec<&str> = csv.lines().skip(1).map(|l| l.split(',').next().unwrap()).collect();
        assert_eq!(steps, vec!["0", "1", "2", "3"]);
    }
}
