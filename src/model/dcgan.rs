//! DCGAN wrapper combining Generator and Discriminator
//!
//! Each network owns its own VarStore so the two optimizers only ever see
//! their own parameters.

use std::path::Path;

use anyhow::{Context, Result};
use tch::{nn, nn::OptimizerConfig, nn::VarStore, Device, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{sample_noise, Generator, GeneratorConfig};

/// Adam hyperparameters shared by both optimizers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamParams {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            lr: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
        }
    }
}

impl AdamParams {
    fn build(&self, vs: &VarStore) -> Result<nn::Optimizer> {
        let adam = nn::Adam {
            beta1: self.beta1,
            beta2: self.beta2,
            ..Default::default()
        };
        Ok(adam.build(vs, self.lr)?)
    }
}

/// Complete DCGAN model
pub struct DCGAN {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub disc_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
}

impl DCGAN {
    /// Create a new DCGAN model
    ///
    /// # Arguments
    ///
    /// * `gen_config` - Generator configuration
    /// * `disc_config` - Discriminator configuration
    /// * `device` - Device to create model on
    pub fn new(gen_config: GeneratorConfig, disc_config: DiscriminatorConfig, device: Device) -> Self {
        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), gen_config);
        let discriminator = Discriminator::new(&disc_vs.root(), disc_config);

        Self {
            generator,
            discriminator,
            gen_vs,
            disc_vs,
            device,
        }
    }

    /// Create a DCGAN where both networks share the same base width
    ///
    /// # Arguments
    ///
    /// * `latent_dim` - Size of latent noise vector
    /// * `conv_dim` - Base channel width
    /// * `device` - Device to create model on
    pub fn with_defaults(latent_dim: i64, conv_dim: i64, device: Device) -> Self {
        let gen_config = GeneratorConfig {
            latent_dim,
            conv_dim,
            ..Default::default()
        };

        let disc_config = DiscriminatorConfig {
            conv_dim,
            ..Default::default()
        };

        Self::new(gen_config, disc_config, device)
    }

    /// Generate images from fresh uniform noise
    ///
    /// # Returns
    ///
    /// Tensor of shape (num_samples, 3, 32, 32) in [-1, 1]
    pub fn generate(&self, num_samples: i64) -> Tensor {
        self.generator.generate_random(num_samples, self.device)
    }

    /// Generate images from specific noise vectors
    pub fn generate_from_noise(&self, noise: &Tensor) -> Tensor {
        self.generator.generate(&noise.to_device(self.device))
    }

    /// Uniform noise batch for this model's latent size
    pub fn noise(&self, batch_size: i64) -> Tensor {
        sample_noise(batch_size, self.latent_dim(), self.device)
    }

    /// Discriminate images (get probability of being real)
    pub fn discriminate(&self, images: &Tensor) -> Tensor {
        self.discriminator.classify(&images.to_device(self.device))
    }

    /// Adam optimizer over the generator's parameters
    pub fn gen_optimizer(&self, params: &AdamParams) -> Result<nn::Optimizer> {
        params.build(&self.gen_vs).context("building generator optimizer")
    }

    /// Adam optimizer over the discriminator's parameters
    pub fn disc_optimizer(&self, params: &AdamParams) -> Result<nn::Optimizer> {
        params.build(&self.disc_vs).context("building discriminator optimizer")
    }

    /// Save both networks' weights
    pub fn save<P: AsRef<Path>>(&self, gen_path: P, disc_path: P) -> Result<()> {
        self.gen_vs
            .save(&gen_path)
            .with_context(|| format!("saving generator to {}", gen_path.as_ref().display()))?;
        self.disc_vs
            .save(&disc_path)
            .with_context(|| format!("saving discriminator to {}", disc_path.as_ref().display()))?;
        Ok(())
    }

    /// Load both networks' weights
    pub fn load<P: AsRef<Path>>(&mut self, gen_path: P, disc_path: P) -> Result<()> {
        self.load_generator(gen_path)?;
        self.disc_vs
            .load(&disc_path)
            .with_context(|| format!("loading discriminator from {}", disc_path.as_ref().display()))?;
        Ok(())
    }

    /// Load only the generator (enough for sampling)
    pub fn load_generator<P: AsRef<Path>>(&mut self, gen_path: P) -> Result<()> {
        self.gen_vs
            .load(&gen_path)
            .with_context(|| format!("loading generator from {}", gen_path.as_ref().display()))?;
        Ok(())
    }

    pub fn latent_dim(&self) -> i64 {
        self.generator.config().latent_dim
    }

    pub fn conv_dim(&self) -> i64 {
        self.generator.config().conv_dim
    }

    /// Total number of trainable parameters in (generator, discriminator)
    pub fn num_parameters(&self) -> (i64, i64) {
        let count = |vs: &VarStore| -> i64 {
            vs.trainable_variables().iter().map(|t| t.numel() as i64).sum()
        };
        (count(&self.gen_vs), count(&self.disc_vs))
    }

    /// Interpolate between two points in latent space
    ///
    /// # Arguments
    ///
    /// * `z1` - First latent vector, shape (latent_dim)
    /// * `z2` - Second latent vector, shape (latent_dim)
    /// * `steps` - Number of interpolation steps (at least 2)
    ///
    /// # Returns
    ///
    /// Tensor of shape (steps, 3, 32, 32)
    pub fn interpolate(&self, z1: &Tensor, z2: &Tensor, steps: i64) -> Tensor {
        let steps = steps.max(2);
        let latents: Vec<Tensor> = (0..steps)
            .map(|i| {
                let alpha = i as f64 / (steps - 1) as f64;
                z1 * (1.0 - alpha) + z2 * alpha
            })
            .collect();

        self.generate_from_noise(&Tensor::stack(&latents, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn test_dcgan_creation() {
        let dcgan = DCGAN::with_defaults(100, 32, Device::Cpu);

        assert_eq!(dcgan.latent_dim(), 100);
        assert_eq!(dcgan.conv_dim(), 32);
    }

    #[test]
    fn test_dcgan_generate() {
        let dcgan = DCGAN::with_defaults(100, 32, Device::Cpu);

        let samples = dcgan.generate(4);
        assert_eq!(samples.size(), vec![4, 3, 32, 32]);
    }

    #[test]
    fn test_dcgan_discriminate() {
        let dcgan = DCGAN::with_defaults(100, 32, Device::Cpu);

        let images = Tensor::rand([4, 3, 32, 32], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let probs = dcgan.discriminate(&images);

        assert_eq!(probs.size(), vec![4, 1]);
    }

    #[test]
    fn test_dcgan_interpolate() {
        let dcgan = DCGAN::with_defaults(100, 16, Device::Cpu);

        let z1 = dcgan.noise(1).squeeze_dim(0);
        let z2 = dcgan.noise(1).squeeze_dim(0);

        let interpolated = dcgan.interpolate(&z1, &z2, 6);
        assert_eq!(interpolated.size(), vec![6, 3, 32, 32]);
    }

    #[test]
    fn test_parameter_stores_are_disjoint() {
        let dcgan = DCGAN::with_defaults(100, 32, Device::Cpu);
        let (gen_params, disc_params) = dcgan.num_parameters();

        // fc: 100 * 2048 + 2048; deconvs: 128*64*16, 64*32*16, 32*3*16; bn: 2*64 + 2*32
        assert_eq!(gen_params, 206_848 + 131_072 + 32_768 + 1_536 + 192);
        // convs: 3*32*16, 32*64*16, 64*128*16; bn: 2*64 + 2*128; fc: 2048 + 1
        assert_eq!(disc_params, 1_536 + 32_768 + 131_072 + 384 + 2_049);
    }

    #[test]
    fn test_save_and_load_generator() {
        let dir = tempfile::tempdir().unwrap();
        let gen_path = dir.path().join("generator.ot");
        let disc_path = dir.path().join("discriminator.ot");

        tch::manual_seed(5);
        let trained = DCGAN::with_defaults(100, 8, Device::Cpu);
        trained.save(&gen_path, &disc_path).unwrap();

        let mut restored = DCGAN::with_defaults(100, 8, Device::Cpu);
        restored.load(&gen_path, &disc_path).unwrap();

        let noise = trained.noise(2);
        let diff = (trained.generate_from_noise(&noise) - restored.generate_from_noise(&noise))
            .abs()
            .max()
            .double_value(&[]);
        assert!(diff < 1e-6);
    }
}
