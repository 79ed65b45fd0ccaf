//! Architecture catalog
//!
//! Each supported backbone is a variant of [`Architecture`] carrying a static
//! [`ArchSpec`]: the backbone layout, the width of its final feature layer,
//! the default loss function, and the backbone freeze policy. Everything
//! downstream dispatches on this table instead of comparing strings.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::{backend::Backend, Int, Tensor};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Supported backbone architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    Densenet,
    Resnet,
}

/// Static description of a backbone architecture
#[derive(Debug, Clone, Copy)]
pub struct ArchSpec {
    /// Width of the pooled feature vector the classifier head consumes
    pub feature_dim: usize,
    /// Output channels of the four convolutional stages
    pub block_widths: [usize; 4],
    /// Whether the stages use residual shortcuts
    pub residual: bool,
    /// Loss function used during fine-tuning
    pub loss: LossKind,
    /// Whether the backbone parameters are frozen before training.
    ///
    /// Only the densenet backbone is frozen; the resnet backbone trains
    /// with gradients enabled even though the optimizer never touches it.
    pub freeze_backbone: bool,
}

const DENSENET_SPEC: ArchSpec = ArchSpec {
    feature_dim: 2208,
    block_widths: [96, 192, 384, 768],
    residual: false,
    loss: LossKind::NegativeLogLikelihood,
    freeze_backbone: true,
};

const RESNET_SPEC: ArchSpec = ArchSpec {
    feature_dim: 2048,
    block_widths: [64, 128, 256, 512],
    residual: true,
    loss: LossKind::CrossEntropy,
    freeze_backbone: false,
};

impl Architecture {
    /// Parse an architecture name.
    ///
    /// Unknown names are not an error: a warning is logged and the default
    /// densenet backbone is used instead.
    pub fn parse(name: &str) -> Self {
        match name {
            "densenet" => Self::Densenet,
            "resnet" => Self::Resnet,
            other => {
                warn!(
                    "Unknown architecture '{}', falling back to densenet",
                    other
                );
                Self::Densenet
            }
        }
    }

    /// Look up the static spec for this architecture
    pub fn spec(&self) -> &'static ArchSpec {
        match self {
            Self::Densenet => &DENSENET_SPEC,
            Self::Resnet => &RESNET_SPEC,
        }
    }

    /// Canonical lowercase name, also used for pretrained weight files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Densenet => "densenet",
            Self::Resnet => "resnet",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Loss function applied to the head's log-probability outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    /// Negative log-likelihood over the head's log-probabilities
    NegativeLogLikelihood,
    /// Burn's cross-entropy applied to the head outputs
    CrossEntropy,
}

impl LossKind {
    /// Compute the scalar loss for a batch.
    ///
    /// `output` is the head output of shape `[batch, num_classes]` (already
    /// log-probabilities), `targets` the class indices of shape `[batch]`.
    pub fn forward<B: Backend>(
        &self,
        output: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        match self {
            Self::NegativeLogLikelihood => {
                let [batch_size, _num_classes] = output.dims();
                let indices = targets.reshape([batch_size, 1]);
                let gathered = output.gather(1, indices);
                gathered.squeeze::<1>(1).neg().mean()
            }
            Self::CrossEntropy => CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output, targets),
        }
    }
}
