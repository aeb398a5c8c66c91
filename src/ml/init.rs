// ============================================================
// Layer 5 — Parameter Initialisation
// ============================================================
// Every trainable layer in the classifier is built through one
// of these constructors:
//
//   Linear / Conv2d → Xavier-normal weights (gain 1), zero bias
//   BatchNorm       → weight (gamma) 1, bias (beta) 0
//
// Re-initialising a module means building it again with the
// same shape through the same functions.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig,
    },
    prelude::*,
};

const XAVIER: Initializer = Initializer::XavierNormal { gain: 1.0 };

pub fn xavier_linear<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output)
        .with_initializer(XAVIER)
        .init(device);
    linear.bias = linear
        .bias
        .map(|_| Param::from_tensor(Tensor::zeros([d_output], device)));
    linear
}

/// Xavier-initialised convolution from a config that already carries
/// stride and padding.
pub fn xavier_conv2d<B: Backend>(config: Conv2dConfig, device: &B::Device) -> Conv2d<B> {
    let out_channels = config.channels[1];
    let mut conv = config.with_initializer(XAVIER).init(device);
    conv.bias = conv
        .bias
        .map(|_| Param::from_tensor(Tensor::zeros([out_channels], device)));
    conv
}

pub fn constant_batch_norm<B: Backend>(num_features: usize, device: &B::Device) -> BatchNorm<B> {
    let mut norm = BatchNormConfig::new(num_features).init(device);
    norm.gamma = Param::from_tensor(Tensor::ones([num_features], device));
    norm.beta  = Param::from_tensor(Tensor::zeros([num_features], device));
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn values<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    fn std_dev(xs: &[f32]) -> f64 {
        let n    = xs.len() as f64;
        let mean = xs.iter().map(|&x| x as f64).sum::<f64>() / n;
        (xs.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n).sqrt()
    }

    #[test]
    fn linear_has_zero_bias_and_xavier_spread() {
        let device = Default::default();
        let linear = xavier_linear::<TestBackend>(512, 256, &device);

        let bias = values(linear.bias.clone().unwrap().val());
        assert!(bias.iter().all(|&b| b == 0.0));

        // Xavier-normal: std = gain * sqrt(2 / (fan_in + fan_out))
        let expected = (2.0 / (512.0 + 256.0_f64)).sqrt();
        let actual   = std_dev(&values(linear.weight.val()));
        assert!((actual - expected).abs() / expected < 0.05, "std {actual} vs {expected}");
    }

    #[test]
    fn conv_has_zero_bias() {
        let device = Default::default();
        let conv   = xavier_conv2d::<TestBackend>(Conv2dConfig::new([3, 8], [3, 3]), &device);

        let bias = values(conv.bias.clone().unwrap().val());
        assert_eq!(bias.len(), 8);
        assert!(bias.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn batch_norm_is_identity_affine() {
        let device = Default::default();
        let norm   = constant_batch_norm::<TestBackend>(16, &device);

        assert!(values(norm.gamma.val()).iter().all(|&g| g == 1.0));
        assert!(values(norm.beta.val()).iter().all(|&b| b == 0.0));
    }

    #[test]
    fn repeated_init_gives_fresh_weights_of_same_shape() {
        let device = Default::default();
        let a = xavier_linear::<TestBackend>(32, 16, &device);
        let b = xavier_linear::<TestBackend>(32, 16, &device);

        assert_eq!(a.weight.val().dims(), b.weight.val().dims());
        assert_ne!(values(a.weight.val()), values(b.weight.val()));
    }
}
