// ============================================================
// Layer 5 — Milestone Evaluation
// ============================================================
// Scores milestone checkpoints on a held-out split.
//
// For each requested epoch, in order:
//   1. load the milestone's model weights (nothing else)
//   2. build the model on the inner backend (dropout off,
//      batch-norm on running statistics)
//   3. one pass, batch size 1:  correct += (argmax == label)
//
// A missing milestone ends the scan; the epochs already scored
// are still reported. The best epoch is the one with the most
// correct predictions; on a tie the earlier epoch stays best.

use std::sync::Arc;

use anyhow::Result;
use burn::prelude::*;

use crate::data::{
    batch_stream::BatchStream,
    batcher::ImageBatcher,
    dataset::{LabelledImage, TryDataset},
};
use crate::infra::checkpoint::{CheckpointError, CheckpointManager};
use crate::ml::{
    inferencer::load_classifier,
    model::{Classifier, SleeveClassifierConfig},
    InferBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochScore {
    pub epoch:   usize,
    pub correct: usize,
    pub total:   usize,
}

impl EpochScore {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    /// Scored epochs, in scan order
    pub scores: Vec<EpochScore>,
    /// `None` when no milestone was scored
    pub best:   Option<EpochScore>,
}

impl EvalReport {
    fn record(&mut self, score: EpochScore) {
        let improved = self.best.map_or(true, |best| score.correct > best.correct);
        if improved {
            self.best = Some(score);
        }
        self.scores.push(score);
    }
}

pub fn run_evaluation<D>(
    epochs:       &[usize],
    model_cfg:    &SleeveClassifierConfig,
    dataset:      Arc<D>,
    ckpt_manager: &CheckpointManager,
    image_size:   usize,
    num_workers:  usize,
) -> Result<EvalReport>
where
    D: TryDataset<LabelledImage> + 'static,
{
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    let batcher = ImageBatcher::<InferBackend>::new(device.clone(), image_size);
    scan_milestones(
        epochs,
        |epoch| match load_classifier::<InferBackend>(ckpt_manager, model_cfg, epoch, &device) {
            Ok(model) => Ok(Some(model)),
            Err(CheckpointError::MissingMilestone { path, .. }) => {
                tracing::info!("No milestone at '{}'; stopping scan", path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        },
        dataset,
        &batcher,
        num_workers,
    )
}

/// Score each epoch's classifier until `load` reports a missing one.
pub fn scan_milestones<B, C, D, L>(
    epochs:      &[usize],
    mut load:    L,
    dataset:     Arc<D>,
    batcher:     &ImageBatcher<B>,
    num_workers: usize,
) -> Result<EvalReport>
where
    B: Backend,
    C: Classifier<B>,
    D: TryDataset<LabelledImage> + 'static,
    L: FnMut(usize) -> Result<Option<C>>,
{
    let mut report = EvalReport::default();

    for &epoch in epochs {
        let Some(classifier) = load(epoch)? else { break };

        let (correct, total) = count_correct(&classifier, dataset.clone(), batcher, num_workers)?;
        let score = EpochScore { epoch, correct, total };
        tracing::info!(
            "Epoch {:>3} | {}/{} correct | accuracy={:.2}%",
            epoch, correct, total, score.accuracy() * 100.0,
        );
        report.record(score);
    }

    Ok(report)
}

/// One pass with batch size 1 → (correct, total).
pub fn count_correct<B, C, D>(
    classifier:  &C,
    dataset:     Arc<D>,
    batcher:     &ImageBatcher<B>,
    num_workers: usize,
) -> Result<(usize, usize)>
where
    B: Backend,
    C: Classifier<B>,
    D: TryDataset<LabelledImage> + 'static,
{
    let mut correct = 0usize;
    let mut total   = 0usize;

    for items in BatchStream::sequential(dataset, 1, num_workers) {
        let batch = batcher.labelled(items?);
        total += batch.labels.dims()[0];

        let hits: i64 = classifier
            .predict(batch.images)
            .equal(batch.labels)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        correct += hits as usize;
    }

    Ok((correct, total))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use burn::backend::NdArray;
    use burn::data::dataset::InMemDataset;

    type TestBackend = NdArray;

    /// Predicts the same class for every image.
    struct Constant(i64);

    impl Classifier<TestBackend> for Constant {
        fn predict(&self, images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 1, Int> {
            let [batch, _, _, _] = images.dims();
            Tensor::full([batch], self.0, &images.device())
        }
    }

    fn dataset(labels: &[usize]) -> Arc<InMemDataset<LabelledImage>> {
        let items = labels
            .iter()
            .map(|&label| LabelledImage { image: vec![0.0; 3], label })
            .collect();
        Arc::new(InMemDataset::new(items))
    }

    fn batcher() -> ImageBatcher<TestBackend> {
        ImageBatcher::new(Default::default(), 1)
    }

    #[test]
    fn fixed_class_accuracy_is_class_frequency() {
        let labels = [0, 1, 1, 0, 1, 1, 1];
        let (correct, total) = count_correct(&Constant(1), dataset(&labels), &batcher(), 2).unwrap();

        assert_eq!(total, 7);
        assert_eq!(correct, 5);
    }

    #[test]
    fn missing_first_milestone_scores_nothing() {
        let compared = Cell::new(0);
        let report = scan_milestones(
            &[25, 30],
            |_| {
                compared.set(compared.get() + 1);
                Ok(None::<Constant>)
            },
            dataset(&[0, 1]),
            &batcher(),
            1,
        )
        .unwrap();

        assert!(report.scores.is_empty());
        assert_eq!(report.best, None);
        // The scan stopped at the first missing epoch
        assert_eq!(compared.get(), 1);
    }

    #[test]
    fn best_is_strictly_greater_and_earlier_wins_ties() {
        // Epoch → constant class; labels favour class 1
        let classes = |epoch: usize| match epoch {
            5  => 0,
            10 => 1,
            15 => 1,
            _  => 0,
        };
        let report = scan_milestones(
            &[5, 10, 15],
            |epoch| Ok(Some(Constant(classes(epoch)))),
            dataset(&[1, 1, 0]),
            &batcher(),
            1,
        )
        .unwrap();

        assert_eq!(report.scores.len(), 3);
        assert_eq!(report.best, Some(EpochScore { epoch: 10, correct: 2, total: 3 }));
    }

    #[test]
    fn scan_stops_at_first_gap() {
        let report = scan_milestones(
            &[5, 10, 15],
            |epoch| Ok((epoch != 10).then_some(Constant(0))),
            dataset(&[0, 1]),
            &batcher(),
            1,
        )
        .unwrap();

        let epochs: Vec<usize> = report.scores.iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, vec![5]);
        assert_eq!(report.best.map(|b| b.accuracy()), Some(0.5));
    }
}
