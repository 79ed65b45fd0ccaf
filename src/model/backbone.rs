//! Convolutional backbone
//!
//! The feature-extraction half of the network: four convolutional stages
//! followed by a 1x1 transition convolution and global average pooling,
//! producing the flat feature vector the classifier head consumes. The stage
//! widths, residual wiring and output width come from the architecture
//! catalog, so a densenet-shaped and a resnet-shaped backbone are the same
//! module configured differently.
//!
//! Pretrained weights are plain Burn record files, one per architecture,
//! loaded with the `CompactRecorder` when available.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use tracing::{info, warn};

use super::arch::Architecture;

/// A convolutional stage: Conv2d, BatchNorm, ReLU, MaxPool, with an optional
/// 1x1 projection shortcut for residual variants.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
    pool: MaxPool2d,
    shortcut: Option<Conv2d<B>>,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new stage mapping `in_channels` to `out_channels` at half
    /// the spatial resolution.
    pub fn new(in_channels: usize, out_channels: usize, residual: bool, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        let shortcut = if residual {
            Some(Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device))
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
            shortcut,
        }
    }

    /// Forward pass through the stage
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = self.conv.forward(x.clone());
        let y = self.bn.forward(y);
        let y = self.relu.forward(y);
        let y = self.pool.forward(y);

        match &self.shortcut {
            Some(projection) => {
                let skip = self.pool.forward(projection.forward(x));
                y + skip
            }
            None => y,
        }
    }
}

/// Pretrained feature extractor
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    transition: Conv2d<B>,
    global_pool: AdaptiveAvgPool2d,
    feature_dim: usize,
}

impl<B: Backend> Backbone<B> {
    /// Build a randomly initialized backbone for the given architecture.
    pub fn new(arch: Architecture, device: &B::Device) -> Self {
        let spec = arch.spec();

        let mut blocks = Vec::with_capacity(spec.block_widths.len());
        let mut in_channels = 3;
        for &out_channels in &spec.block_widths {
            blocks.push(ConvBlock::new(
                in_channels,
                out_channels,
                spec.residual,
                device,
            ));
            in_channels = out_channels;
        }

        let transition = Conv2dConfig::new([in_channels, spec.feature_dim], [1, 1]).init(device);
        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        Self {
            blocks,
            transition,
            global_pool,
            feature_dim: spec.feature_dim,
        }
    }

    /// Build a backbone and load pretrained weights from
    /// `<weights_dir>/<arch>.mpk` when the file exists.
    ///
    /// A missing or unreadable weight file is not fatal: the backbone keeps
    /// its random initialization and training starts from scratch.
    pub fn pretrained(arch: Architecture, weights_dir: &Path, device: &B::Device) -> Self {
        let backbone = Self::new(arch, device);

        let stem = weights_dir.join(arch.name());
        if !stem.with_extension("mpk").exists() {
            warn!(
                "No pretrained weights at {:?}, backbone starts from random initialization",
                stem.with_extension("mpk")
            );
            return backbone;
        }

        let recorder = CompactRecorder::new();
        match backbone.clone().load_file(stem.clone(), &recorder, device) {
            Ok(loaded) => {
                info!("Loaded pretrained {} backbone from {:?}", arch, stem);
                loaded
            }
            Err(e) => {
                warn!(
                    "Failed to load pretrained weights from {:?} ({:?}), using random initialization",
                    stem, e
                );
                backbone
            }
        }
    }

    /// Width of the pooled feature vector
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Forward pass: `[batch, 3, H, W]` -> `[batch, feature_dim]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.transition.forward(x);
        let x = self.global_pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }
}
