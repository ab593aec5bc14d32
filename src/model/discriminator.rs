//! Discriminator network for DCGAN
//!
//! The Discriminator classifies 32x32 RGB images as real or fake.
//! Downsampling is done entirely with strided convolutions, no pooling.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::layers::{conv, leaky_relu, ConvBlock};

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Depth of the first convolution; doubled at each following layer
    pub conv_dim: i64,
    /// Number of input channels (3 for RGB)
    pub in_channels: i64,
    /// Negative slope of the LeakyReLU activations
    pub leaky_slope: f64,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            conv_dim: 32,
            in_channels: 3,
            leaky_slope: 0.2,
        }
    }
}

/// Discriminator network
///
/// Architecture:
/// 1. conv(3 -> d), no batch norm, LeakyReLU: 32x32 -> 16x16
/// 2. conv(d -> 2d) + BatchNorm, LeakyReLU: 16x16 -> 8x8
/// 3. conv(2d -> 4d) + BatchNorm, LeakyReLU: 8x8 -> 4x4
/// 4. Flatten and Linear(4d * 4 * 4 -> 1)
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    conv1: ConvBlock,
    conv2: ConvBlock,
    conv3: ConvBlock,
    fc: nn::Linear,
}

impl Discriminator {
    /// Create a new Discriminator network
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let d = config.conv_dim;

        let conv1 = conv(&(vs / "conv1"), config.in_channels, d, 4, 2, 1, false);
        let conv2 = conv(&(vs / "conv2"), d, d * 2, 4, 2, 1, true);
        let conv3 = conv(&(vs / "conv3"), d * 2, d * 4, 4, 2, 1, true);
        let fc = nn::linear(vs / "fc", Self::flat_size(d), 1, Default::default());

        Self {
            config,
            conv1,
            conv2,
            conv3,
            fc,
        }
    }

    /// Number of features entering the final linear layer
    fn flat_size(conv_dim: i64) -> i64 {
        conv_dim * 4 * 4 * 4
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch_size, 3, 32, 32) scaled to [-1, 1]
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 1) with logits (not sigmoid)
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let slope = self.config.leaky_slope;

        let x = leaky_relu(&self.conv1.forward_t(input, train), slope);
        let x = leaky_relu(&self.conv2.forward_t(&x, train), slope);
        let x = leaky_relu(&self.conv3.forward_t(&x, train), slope);

        let x = x.view([-1, Self::flat_size(self.config.conv_dim)]);
        self.fc.forward(&x)
    }

    /// Classify images (inference mode)
    ///
    /// Returns probability of being real (after sigmoid)
    pub fn classify(&self, input: &Tensor) -> Tensor {
        tch::no_grad(|| self.forward_t(input, false).sigmoid())
    }

    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

impl ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Discriminator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_discriminator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), DiscriminatorConfig::default());

        for batch in [1, 5, 16] {
            let input = Tensor::rand([batch, 3, 32, 32], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
            let output = disc.forward_t(&input, true);
            assert_eq!(output.size(), vec![batch, 1]);
        }
    }

    #[test]
    fn test_discriminator_classify() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), DiscriminatorConfig::default());

        let input = Tensor::randn([4, 3, 32, 32], (Kind::Float, Device::Cpu));
        let probs = disc.classify(&input);

        let min_val = probs.min().double_value(&[]);
        let max_val = probs.max().double_value(&[]);
        assert!(min_val >= 0.0 && max_val <= 1.0);
    }

    #[test]
    fn test_discriminator_custom_width() {
        let vs = VarStore::new(Device::Cpu);
        let config = DiscriminatorConfig {
            conv_dim: 8,
            ..Default::default()
        };
        let disc = Discriminator::new(&vs.root(), config);

        let input = Tensor::randn([3, 3, 32, 32], (Kind::Float, Device::Cpu));
        assert_eq!(disc.forward_t(&input, false).size(), vec![3, 1]);
    }
}
