use burn::{
    nn::{Dropout, DropoutConfig, Linear, Relu},
    prelude::*,
};

use crate::domain::sleeve::NUM_CLASSES;
use crate::ml::init::xavier_linear;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ClassificationHeadConfig {
    pub feature_dim: usize,
    #[config(default = "256")]
    pub hidden:      usize,
    #[config(default = "0.5")]
    pub dropout:     f64,
}

impl ClassificationHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassificationHead<B> {
        ClassificationHead {
            fc1:     xavier_linear(self.feature_dim, self.hidden, device),
            fc2:     xavier_linear(self.hidden, self.hidden, device),
            fc3:     xavier_linear(self.hidden, NUM_CLASSES, device),
            dropout: DropoutConfig::new(self.dropout).init(),
            relu:    Relu::new(),
        }
    }
}

/// Feature vector → 2 logits (sleeve, sleeveless).
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    pub fc1:     Linear<B>,
    pub fc2:     Linear<B>,
    pub fc3:     Linear<B>,
    pub dropout: Dropout,
    pub relu:    Relu,
}

impl<B: Backend> ClassificationHead<B> {
    /// features: [batch, feature_dim] → logits: [batch, 2]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(self.relu.forward(self.fc1.forward(features)));
        let x = self.dropout.forward(self.relu.forward(self.fc2.forward(x)));
        self.fc3.forward(x)
    }

    /// The configuration this head was built from.
    pub fn config(&self) -> ClassificationHeadConfig {
        let [feature_dim, hidden] = self.fc1.weight.val().dims();
        ClassificationHeadConfig::new(feature_dim)
            .with_hidden(hidden)
            .with_dropout(self.dropout.prob)
    }

    /// A freshly initialised head of the same shape.
    pub fn reset_parameters(&self, device: &B::Device) -> Self {
        self.config().init(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn maps_features_to_two_logits() {
        let device = Default::default();
        let head: ClassificationHead<TestBackend> = ClassificationHeadConfig::new(16).init(&device);

        let logits = head.forward(Tensor::ones([4, 16], &device));
        assert_eq!(logits.dims(), [4, NUM_CLASSES]);
    }

    #[test]
    fn reset_keeps_shape_and_redraws_weights() {
        let device = Default::default();
        let head: ClassificationHead<TestBackend> =
            ClassificationHeadConfig::new(32).with_hidden(8).init(&device);

        let reset = head.reset_parameters(&device);

        assert_eq!(reset.fc1.weight.val().dims(), [32, 8]);
        assert_eq!(reset.fc2.weight.val().dims(), [8, 8]);
        assert_eq!(reset.fc3.weight.val().dims(), [8, NUM_CLASSES]);
        assert_eq!(reset.dropout.prob, 0.5);

        let before: Vec<f32> = head.fc1.weight.val().into_data().to_vec().unwrap();
        let after:  Vec<f32> = reset.fc1.weight.val().into_data().to_vec().unwrap();
        assert_ne!(before, after);

        let bias: Vec<f32> = reset.fc3.bias.clone().unwrap().val().into_data().to_vec().unwrap();
        assert!(bias.iter().all(|&b| b == 0.0));
    }
}
