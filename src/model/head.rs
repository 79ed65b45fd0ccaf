//! Classifier head
//!
//! The trainable stack attached on top of the backbone. The shape is fixed:
//! `Linear(feature_dim, hidden_units) -> Dropout -> ReLU ->
//! Linear(hidden_units, 256) -> ReLU -> Linear(256, 128) -> ReLU ->
//! Linear(128, num_classes) -> LogSoftmax`. It is rebuilt fresh for every
//! training run and every checkpoint load.

use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{activation::log_softmax, backend::Backend, Tensor},
};

/// Feed-forward head mapping backbone features to class log-probabilities
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
    fc3: Linear<B>,
    fc4: Linear<B>,
    relu: Relu,
    num_classes: usize,
}

impl<B: Backend> ClassifierHead<B> {
    /// Create a new head for `feature_dim`-wide inputs.
    pub fn new(
        hidden_units: usize,
        feature_dim: usize,
        num_classes: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            fc1: LinearConfig::new(feature_dim, hidden_units).init(device),
            dropout: DropoutConfig::new(0.5).init(),
            fc2: LinearConfig::new(hidden_units, 256).init(device),
            fc3: LinearConfig::new(256, 128).init(device),
            fc4: LinearConfig::new(128, num_classes).init(device),
            relu: Relu::new(),
            num_classes,
        }
    }

    /// Forward pass: `[batch, feature_dim]` -> log-probabilities
    /// `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(x);
        let x = self.dropout.forward(x);
        let x = self.relu.forward(x);
        let x = self.fc2.forward(x);
        let x = self.relu.forward(x);
        let x = self.fc3.forward(x);
        let x = self.relu.forward(x);
        let x = self.fc4.forward(x);
        log_softmax(x, 1)
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use burn::tensor::Distribution;

    type B = DefaultBackend;

    #[test]
    fn test_head_output_shape() {
        let device = Default::default();
        let head = ClassifierHead::<B>::new(32, 64, 7, &device);

        let input = Tensor::<B, 2>::random([4, 64], Distribution::Default, &device);
        let output = head.forward(input);

        assert_eq!(output.dims(), [4, 7]);
    }

    #[test]
    fn test_head_outputs_log_probabilities() {
        let device = Default::default();
        let head = ClassifierHead::<B>::new(16, 8, 5, &device);

        let input = Tensor::<B, 2>::random([1, 8], Distribution::Default, &device);
        let output = head.forward(input);

        // exp of log-probabilities must sum to ~1 per row
        let sum: f32 = output.exp().sum().into_scalar();
        assert!((sum - 1.0).abs() < 1e-4, "probabilities sum to {}", sum);
    }
}
