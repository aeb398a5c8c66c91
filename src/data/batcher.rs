// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Stacks plain dataset items into device tensors.
//
//   Input:  N items, each a flat CHW vector of 3 · S · S floats
//   Output: images [N, 3, S, S], ImageNet-normalised
//           + labels [N] (labelled) or identifiers (named)
//
// Normalisation per channel:  (x - mean) / std
//   mean = [0.485, 0.456, 0.406]
//   std  = [0.229, 0.224, 0.225]
//
// Runs on the main thread; the BatchStream workers only decode
// images, they never touch the device.
//
// Reference: Burn Book §4 (Batcher)

use burn::prelude::*;

use crate::data::dataset::{LabelledImage, NamedImage};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

// ─── Batches ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LabelledBatch<B: Backend> {
    /// Shape: [batch_size, 3, image_size, image_size]
    pub images: Tensor<B, 4>,
    /// Class codes, shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Debug, Clone)]
pub struct NamedBatch<B: Backend> {
    pub images:      Tensor<B, 4>,
    /// One identifier per row of `images`
    pub identifiers: Vec<String>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device:     B::Device,
    pub image_size: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }

    pub fn labelled(&self, items: Vec<LabelledImage>) -> LabelledBatch<B> {
        let batch_size = items.len();
        let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let images = self.images(items.into_iter().map(|item| item.image), batch_size);

        let labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [batch_size]),
            &self.device,
        );

        LabelledBatch { images, labels }
    }

    pub fn named(&self, items: Vec<NamedImage>) -> NamedBatch<B> {
        let batch_size = items.len();
        let (pixels, identifiers): (Vec<Vec<f32>>, Vec<String>) = items
            .into_iter()
            .map(|item| (item.image, item.identifier))
            .unzip();

        NamedBatch {
            images: self.images(pixels.into_iter(), batch_size),
            identifiers,
        }
    }

    fn images(&self, pixels: impl Iterator<Item = Vec<f32>>, batch_size: usize) -> Tensor<B, 4> {
        let size = self.image_size;
        let flat: Vec<f32> = pixels.flatten().collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(flat, [batch_size, 3, size, size]),
            &self.device,
        );
        let mean = Tensor::<B, 4>::from_data(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            &self.device,
        );
        let std = Tensor::<B, 4>::from_data(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            &self.device,
        );

        (images - mean) / std
    }
}
