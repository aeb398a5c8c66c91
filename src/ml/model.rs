use std::path::Path;

use anyhow::Result;
use burn::{nn::loss::CrossEntropyLossConfig, prelude::*};

use crate::ml::backbone::{Backbone, BackboneKind, Encoder};
use crate::ml::head::{ClassificationHead, ClassificationHeadConfig};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct SleeveClassifierConfig {
    pub backbone:     BackboneKind,
    /// Width of the first lite-CNN block; ignored by ResNet-18
    #[config(default = "16")]
    pub lite_filters: usize,
    #[config(default = "256")]
    pub hidden:       usize,
    #[config(default = "0.5")]
    pub dropout:      f64,
}

impl SleeveClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SleeveClassifier<B> {
        let backbone = Backbone::new(self.backbone, self.lite_filters, device);
        let head = ClassificationHeadConfig::new(backbone.feature_dim())
            .with_hidden(self.hidden)
            .with_dropout(self.dropout)
            .init(device);
        SleeveClassifier { backbone, head }
    }
}

#[derive(Module, Debug)]
pub struct SleeveClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub head:     ClassificationHead<B>,
}

impl<B: Backend> SleeveClassifier<B> {
    /// images: [batch, 3, H, W] → logits: [batch, 2]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    /// Mean cross-entropy over the batch.
    pub fn forward_loss(
        &self,
        images: Tensor<B, 4>,
        labels: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let ce = CrossEntropyLossConfig::new().init(&logits.device());
        let loss = ce.forward(logits.clone(), labels);
        (loss, logits)
    }

    pub fn with_pretrained_backbone(mut self, path: &Path, device: &B::Device) -> Result<Self> {
        self.backbone = self.backbone.load_pretrained(path, device)?;
        Ok(self)
    }

    /// Stop gradients for every backbone parameter; only the head trains.
    pub fn freeze_backbone(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────

/// Anything that assigns a class index to each image in a batch.
pub trait Classifier<B: Backend> {
    /// images: [batch, 3, H, W] → class indices: [batch]
    fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int>;
}

impl<B: Backend> Classifier<B> for SleeveClassifier<B> {
    fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        // argmax(1) returns shape [batch, 1]
        self.forward(images).argmax(1).flatten::<1>(0, 1)
    }
}
