// ============================================================
// Layer 5 — Feature Backbones
// ============================================================
// A backbone turns a batch of normalised images into one
// feature vector per image:
//
//   [batch, 3, H, W] → [batch, feature_dim]
//
// Two architectures implement the `Encoder` trait:
//
//   ResNet18Encoder — stem + 4 residual stages + global average
//                     pooling, no classification layer.
//                     feature_dim = 512
//
//   LiteEncoder     — three conv/BN/ReLU/max-pool blocks +
//                     global average pooling. Small enough for
//                     CPU runs and tests.
//                     feature_dim = 4 · base_filters
//
// `Backbone` is the enum the classifier actually holds so the
// record layout follows whichever architecture was configured.
//
// Reference: He et al. (2016) Deep Residual Learning for Image Recognition

use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, PaddingConfig2d, Relu,
    },
    prelude::*,
    record::{BinFileRecorder, FullPrecisionSettings},
};
use serde::{Deserialize, Serialize};

use crate::ml::init::{constant_batch_norm, xavier_conv2d};

/// Output width of the ResNet-18 trunk
pub const RESNET18_FEATURES: usize = 512;

// ─── Encoder trait ────────────────────────────────────────────────────────────

pub trait Encoder<B: Backend> {
    /// images: [batch, 3, H, W] → features: [batch, feature_dim]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    fn feature_dim(&self) -> usize;
}

/// Which architecture to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackboneKind {
    Resnet18,
    Lite,
}

/// [batch, C, 1, 1] → [batch, C]
fn flatten_pooled<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, _, _] = x.dims();
    x.reshape([batch, channels])
}

fn padded(channels: [usize; 2], kernel: usize, stride: usize) -> Conv2dConfig {
    let pad = kernel / 2;
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
}

// ─── ResNet-18 ────────────────────────────────────────────────────────────────

/// 1×1 strided projection applied to the residual when a block
/// changes resolution or width.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn:   BatchNorm<B>,
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1:      Conv2d<B>,
    pub bn1:        BatchNorm<B>,
    pub conv2:      Conv2d<B>,
    pub bn2:        BatchNorm<B>,
    pub downsample: Option<Downsample<B>>,
    pub relu:       Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != out_channels).then(|| Downsample {
            conv: xavier_conv2d(
                Conv2dConfig::new([in_channels, out_channels], [1, 1]).with_stride([stride, stride]),
                device,
            ),
            bn: constant_batch_norm(out_channels, device),
        });

        Self {
            conv1: xavier_conv2d(padded([in_channels, out_channels], 3, stride), device),
            bn1:   constant_batch_norm(out_channels, device),
            conv2: xavier_conv2d(padded([out_channels, out_channels], 3, 1), device),
            bn2:   constant_batch_norm(out_channels, device),
            downsample,
            relu:  Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(down) => down.bn.forward(down.conv.forward(x.clone())),
            None       => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));
        self.relu.forward(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet18Encoder<B: Backend> {
    pub conv1:   Conv2d<B>,
    pub bn1:     BatchNorm<B>,
    pub relu:    Relu,
    pub maxpool: MaxPool2d,
    pub layer1:  Vec<BasicBlock<B>>,
    pub layer2:  Vec<BasicBlock<B>>,
    pub layer3:  Vec<BasicBlock<B>>,
    pub layer4:  Vec<BasicBlock<B>>,
    pub avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNet18Encoder<B> {
    pub fn new(device: &B::Device) -> Self {
        let stage = |in_c: usize, out_c: usize, stride: usize| {
            vec![
                BasicBlock::new(in_c, out_c, stride, device),
                BasicBlock::new(out_c, out_c, 1, device),
            ]
        };

        Self {
            conv1:   xavier_conv2d(padded([3, 64], 7, 2), device),
            bn1:     constant_batch_norm(64, device),
            relu:    Relu::new(),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1:  stage(64, 64, 1),
            layer2:  stage(64, 128, 2),
            layer3:  stage(128, 256, 2),
            layer4:  stage(256, 512, 2),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

impl<B: Backend> Encoder<B> for ResNet18Encoder<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(images)));
        let mut x = self.maxpool.forward(x);

        for block in self.layer1.iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        flatten_pooled(self.avgpool.forward(x))
    }

    fn feature_dim(&self) -> usize {
        RESNET18_FEATURES
    }
}

// ─── Lite CNN ─────────────────────────────────────────────────────────────────

/// Conv 3×3 → BatchNorm → ReLU → MaxPool 2×2
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn:   BatchNorm<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: xavier_conv2d(padded([in_channels, out_channels], 3, 1), device),
            bn:   constant_batch_norm(out_channels, device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(self.relu.forward(self.bn.forward(self.conv.forward(x))))
    }
}

#[derive(Module, Debug)]
pub struct LiteEncoder<B: Backend> {
    pub block1:      ConvBlock<B>,
    pub block2:      ConvBlock<B>,
    pub block3:      ConvBlock<B>,
    pub global_pool: AdaptiveAvgPool2d,
}

impl<B: Backend> LiteEncoder<B> {
    pub fn new(base_filters: usize, device: &B::Device) -> Self {
        Self {
            block1:      ConvBlock::new(3, base_filters, device),
            block2:      ConvBlock::new(base_filters, base_filters * 2, device),
            block3:      ConvBlock::new(base_filters * 2, base_filters * 4, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

impl<B: Backend> Encoder<B> for LiteEncoder<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(images);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);
        flatten_pooled(self.global_pool.forward(x))
    }

    fn feature_dim(&self) -> usize {
        // Conv weight layout: [out_channels, in_channels, k, k]
        self.block3.conv.weight.val().dims()[0]
    }
}

// ─── Backbone ─────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    ResNet18(ResNet18Encoder<B>),
    Lite(LiteEncoder<B>),
}

impl<B: Backend> Backbone<B> {
    pub fn new(kind: BackboneKind, lite_filters: usize, device: &B::Device) -> Self {
        match kind {
            BackboneKind::Resnet18 => Backbone::ResNet18(ResNet18Encoder::new(device)),
            BackboneKind::Lite     => Backbone::Lite(LiteEncoder::new(lite_filters, device)),
        }
    }

    /// Replace the parameters with a pretrained record file written by
    /// Burn's binary file recorder.
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let loaded = self
            .load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| format!("Cannot load backbone weights from '{}'", path.display()))?;

        tracing::info!("Loaded pretrained backbone from '{}'", path.display());
        Ok(loaded)
    }
}

impl<B: Backend> Encoder<B> for Backbone<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Backbone::ResNet18(encoder) => encoder.forward(images),
            Backbone::Lite(encoder)     => encoder.forward(images),
        }
    }

    fn feature_dim(&self) -> usize {
        match self {
            Backbone::ResNet18(encoder) => encoder.feature_dim(),
            Backbone::Lite(encoder)     => encoder.feature_dim(),
        }
    }
}
