//! Model assembly
//!
//! Combines a pretrained [`Backbone`] with a fresh [`ClassifierHead`] into
//! the full network, and applies the per-architecture freeze policy.

pub mod arch;
pub mod backbone;
pub mod head;

use std::path::Path;

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};

pub use arch::{ArchSpec, Architecture, LossKind};
pub use backbone::Backbone;
pub use head::ClassifierHead;

/// Full classification network: backbone features plus classifier head.
///
/// Output is always log-probabilities, shape `[batch, num_classes]`.
#[derive(Module, Debug)]
pub struct FlowerNet<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: ClassifierHead<B>,
}

impl<B: Backend> FlowerNet<B> {
    /// Forward pass through backbone and head
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        self.head.forward(features)
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }
}

/// Build the full network for an architecture.
///
/// The backbone feature width comes from the architecture catalog and always
/// matches the head's input width. When `weights_dir` is given, pretrained
/// backbone weights are loaded from it if present.
pub fn build_network<B: Backend>(
    arch: Architecture,
    hidden_units: usize,
    num_classes: usize,
    weights_dir: Option<&Path>,
    device: &B::Device,
) -> FlowerNet<B> {
    let backbone = match weights_dir {
        Some(dir) => Backbone::pretrained(arch, dir, device),
        None => Backbone::new(arch, device),
    };

    let head = ClassifierHead::new(hidden_units, backbone.feature_dim(), num_classes, device);

    FlowerNet { backbone, head }
}

/// Apply the architecture's freeze policy to the backbone.
///
/// For architectures that freeze (densenet), gradient tracking is disabled
/// on every backbone parameter. Other architectures are returned unchanged.
pub fn apply_freeze_policy<B: Backend>(mut model: FlowerNet<B>, arch: Architecture) -> FlowerNet<B> {
    if arch.spec().freeze_backbone {
        model.backbone = model.backbone.no_grad();
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    #[test]
    fn test_backbone_and_head_widths_agree() {
        let device = Default::default();

        // For every supported architecture the pooled feature width must
        // flow into the head without a shape error.
        for arch in [Architecture::Densenet, Architecture::Resnet] {
            let model = build_network::<B>(arch, 16, 5, None, &device);
            let input = Tensor::<B, 4>::zeros([1, 3, 32, 32], &device);
            let output = model.forward(input);
            assert_eq!(output.dims(), [1, 5]);
        }
    }

    #[test]
    fn test_freeze_policy_keeps_model_usable() {
        let device = Default::default();
        let model = build_network::<B>(Architecture::Densenet, 16, 3, None, &device);
        let model = apply_freeze_policy(model, Architecture::Densenet);

        let input = Tensor::<B, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 3]);
    }
}
