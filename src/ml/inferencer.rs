// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Loads one milestone's weights on the inner backend and writes
// a prediction record for every image in a folder.
//
//   image → argmax class → {"sleeve_type": [code], "product_type": "top"}
//
// Batches hold a single image so every record carries exactly
// one prediction.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::data::{
    batch_stream::BatchStream,
    batcher::ImageBatcher,
    dataset::{NamedImage, TryDataset},
};
use crate::domain::{result_record::ResultRecord, sleeve::SleeveType, traits::PredictionSink};
use crate::infra::checkpoint::{CheckpointError, CheckpointManager};
use crate::ml::{
    model::{Classifier, SleeveClassifier, SleeveClassifierConfig},
    InferBackend,
};

/// Build the classifier and load a milestone's weights into it.
/// Only the `state_dict` section is decoded.
pub fn load_classifier<B: Backend>(
    ckpt_manager: &CheckpointManager,
    model_cfg:    &SleeveClassifierConfig,
    epoch:        usize,
    device:       &B::Device,
) -> Result<SleeveClassifier<B>, CheckpointError> {
    let bundle = ckpt_manager.load_milestone(epoch)?;
    let record = bundle.model_record::<B, _>(device)?;
    tracing::info!("Loaded milestone for epoch {}", epoch);
    Ok(model_cfg.init::<B>(device).load_record(record))
}

pub fn run_inference<D>(
    epoch:        usize,
    model_cfg:    &SleeveClassifierConfig,
    dataset:      Arc<D>,
    ckpt_manager: &CheckpointManager,
    sink:         &dyn PredictionSink,
    image_size:   usize,
    num_workers:  usize,
) -> Result<usize>
where
    D: TryDataset<NamedImage> + 'static,
{
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    let model   = load_classifier::<InferBackend>(ckpt_manager, model_cfg, epoch, &device)?;
    let batcher = ImageBatcher::<InferBackend>::new(device, image_size);
    predict_all(&model, dataset, &batcher, sink, num_workers)
}

/// Predict every image and hand each record to `sink`.
/// Returns the number of records written.
pub fn predict_all<B, C, D>(
    classifier:  &C,
    dataset:     Arc<D>,
    batcher:     &ImageBatcher<B>,
    sink:        &dyn PredictionSink,
    num_workers: usize,
) -> Result<usize>
where
    B: Backend,
    C: Classifier<B>,
    D: TryDataset<NamedImage> + 'static,
{
    let mut written = 0usize;

    for items in BatchStream::sequential(dataset, 1, num_workers) {
        let batch = batcher.named(items?);
        let codes = classifier.predict(batch.images).into_data();

        for (identifier, code) in batch.identifiers.iter().zip(codes.iter::<i64>()) {
            let class = SleeveType::from_code(code as usize)
                .ok_or_else(|| anyhow!("Model produced unknown class {code} for '{identifier}'"))?;
            sink.write(identifier, &ResultRecord::new(&[class]))?;
            written += 1;
        }
    }

    tracing::info!("Wrote {} predictions", written);
    Ok(written)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use burn::backend::NdArray;
    use burn::data::dataset::InMemDataset;

    use crate::ml::backbone::BackboneKind;

    type TestBackend = NdArray;

    #[derive(Default)]
    struct Collected(Mutex<Vec<(String, ResultRecord)>>);

    impl PredictionSink for Collected {
        fn write(&self, identifier: &str, record: &ResultRecord) -> Result<()> {
            self.0.lock().unwrap().push((identifier.to_string(), record.clone()));
            Ok(())
        }
    }

    fn named(ids: &[&str], size: usize) -> Arc<InMemDataset<NamedImage>> {
        let items = ids
            .iter()
            .map(|id| NamedImage { image: vec![0.5; 3 * size * size], identifier: id.to_string() })
            .collect();
        Arc::new(InMemDataset::new(items))
    }

    #[test]
    fn one_record_per_image_with_one_prediction() {
        let device = Default::default();
        let model: SleeveClassifier<TestBackend> = SleeveClassifierConfig::new(BackboneKind::Lite)
            .with_lite_filters(2)
            .with_hidden(4)
            .init(&device);
        let batcher = ImageBatcher::new(device, 8);
        let sink    = Collected::default();

        let written = predict_all(&model, named(&["a", "b", "c"], 8), &batcher, &sink, 2).unwrap();

        assert_eq!(written, 3);
        let records = sink.0.into_inner().unwrap();
        let ids: Vec<&str> = records.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        for (_, record) in &records {
            assert_eq!(record.sleeve_type.len(), 1);
            assert_eq!(record.product_type, "top");
        }
    }

    #[test]
    fn missing_milestone_is_fatal() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("run.ckpt"));
        let cfg     = SleeveClassifierConfig::new(BackboneKind::Lite);

        let err = load_classifier::<TestBackend>(&manager, &cfg, 25, &Default::default()).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingMilestone { epoch: 25, .. }));
    }
}
