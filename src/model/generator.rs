//! Generator network for DCGAN
//!
//! The Generator turns noise vectors into 32x32 RGB images.
//! Upsampling uses transposed 2D convolutions starting from a 4x4 feature map.

use tch::{nn, nn::Module, nn::ModuleT, Device, Kind, Tensor};

use super::layers::{deconv, DeconvBlock};

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Size of the latent noise vector
    pub latent_dim: i64,
    /// Depth of the last hidden layer; the projection is 4x this
    pub conv_dim: i64,
    /// Number of output channels (3 for RGB)
    pub out_channels: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            latent_dim: 100,
            conv_dim: 32,
            out_channels: 3,
        }
    }
}

/// Sample a batch of latent vectors uniformly from [-1, 1]
pub fn sample_noise(batch_size: i64, latent_dim: i64, device: Device) -> Tensor {
    Tensor::rand([batch_size, latent_dim], (Kind::Float, device)) * 2.0 - 1.0
}

/// Generator network
///
/// Architecture:
/// 1. Linear projection from latent space to 4d * 4 * 4, reshaped to (4d, 4, 4)
/// 2. deconv(4d -> 2d) + BatchNorm, ReLU: 4x4 -> 8x8
/// 3. deconv(2d -> d) + BatchNorm, ReLU: 8x8 -> 16x16
/// 4. deconv(d -> 3), Tanh: 16x16 -> 32x32
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    fc: nn::Linear,
    deconv1: DeconvBlock,
    deconv2: DeconvBlock,
    deconv3: DeconvBlock,
}

impl Generator {
    /// Create a new Generator network
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let d = config.conv_dim;

        let fc = nn::linear(vs / "fc", config.latent_dim, d * 4 * 4 * 4, Default::default());
        let deconv1 = deconv(&(vs / "deconv1"), d * 4, d * 2, 4, 2, 1, true);
        let deconv2 = deconv(&(vs / "deconv2"), d * 2, d, 4, 2, 1, true);
        let deconv3 = deconv(&(vs / "deconv3"), d, config.out_channels, 4, 2, 1, false);

        Self {
            config,
            fc,
            deconv1,
            deconv2,
            deconv3,
        }
    }

    /// Generate images from noise
    ///
    /// # Arguments
    ///
    /// * `noise` - Tensor of shape (batch_size, latent_dim)
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 3, 32, 32) with values in [-1, 1]
    pub fn forward_t(&self, noise: &Tensor, train: bool) -> Tensor {
        let x = self.fc.forward(noise);
        let x = x.view([-1, self.config.conv_dim * 4, 4, 4]);

        let x = self.deconv1.forward_t(&x, train).relu();
        let x = self.deconv2.forward_t(&x, train).relu();
        self.deconv3.forward_t(&x, train).tanh()
    }

    /// Generate images in evaluation mode without tracking gradients
    ///
    /// Batch norm uses its running statistics instead of batch statistics.
    pub fn generate(&self, noise: &Tensor) -> Tensor {
        tch::no_grad(|| self.forward_t(noise, false))
    }

    /// Generate images from fresh uniform noise
    pub fn generate_random(&self, num_samples: i64, device: Device) -> Tensor {
        let noise = sample_noise(num_samples, self.config.latent_dim, device);
        self.generate(&noise)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Generator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::nn::VarStore;

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), GeneratorConfig::default());

        let noise = sample_noise(4, 100, Device::Cpu);
        let output = gen.forward_t(&noise, true);

        assert_eq!(output.size(), vec![4, 3, 32, 32]);
    }

    #[test]
    fn test_generator_output_bounded() {
        tch::manual_seed(3);
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), GeneratorConfig::default());

        // large inputs push tanh into saturation
        let noise = Tensor::randn([8, 100], (Kind::Float, Device::Cpu)) * 50.0;
        let output = gen.forward_t(&noise, true);

        assert!(output.min().double_value(&[]) >= -1.0);
        assert!(output.max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn test_sample_noise_range() {
        tch::manual_seed(11);
        let noise = sample_noise(64, 100, Device::Cpu);

        assert_eq!(noise.size(), vec![64, 100]);
        assert!(noise.min().double_value(&[]) >= -1.0);
        assert!(noise.max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn test_generate_random_does_not_track_gradients() {
        let vs = VarStore::new(Device::Cpu);
        let gen = Generator::new(&vs.root(), GeneratorConfig::default());

        let images = gen.generate_random(2, Device::Cpu);
        assert_eq!(images.size(), vec![2, 3, 32, 32]);
        assert!(!images.requires_grad());
    }
}
