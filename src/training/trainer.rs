//! Training loop implementation for DCGAN
//!
//! Each batch runs one discriminator update followed by one generator update.
//! At the end of every epoch the generator is sampled on a fixed noise batch
//! so progress can be compared visually across epochs.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tch::{nn, Device, Kind, Tensor};
use tracing::{debug, info, warn};

use super::losses::{discriminator_loss, generator_loss};
use super::metrics::TrainingMetrics;
use crate::data::{scale, DataLoader, FeatureRange};
use crate::model::{AdamParams, DCGAN};
use crate::utils::{load_samples, plot_losses, save_checkpoint, save_image_grid, save_samples};

/// Per-epoch generated samples
pub const SAMPLES_FILE: &str = "train_samples.ot";
/// Fixed noise batch reused for every epoch's samples
pub const FIXED_NOISE_FILE: &str = "fixed_noise.ot";
pub const LOSSES_FILE: &str = "losses.csv";
pub const EPOCHS_FILE: &str = "epochs.csv";
pub const LOSS_PLOT_FILE: &str = "losses.png";
pub const LAST_GRID_FILE: &str = "samples_last_epoch.png";
pub const GENERATOR_FINAL_FILE: &str = "generator_final.ot";
pub const DISCRIMINATOR_FINAL_FILE: &str = "discriminator_final.ot";
pub const CHECKPOINT_DIR: &str = "checkpoints";

const GRID_COLUMNS: usize = 8;
const GRID_UPSCALE: u32 = 4;
const COLLAPSE_WINDOW: usize = 10;

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Adam settings for both networks
    pub optimizer: AdamParams,
    /// Log and record losses every N batches
    pub print_every: usize,
    /// Size of the fixed noise batch sampled after each epoch
    pub sample_size: i64,
    /// Train the discriminator against 0.9 instead of 1.0 for real images
    pub label_smoothing: bool,
    /// Save checkpoint every N epochs (0 disables)
    pub checkpoint_every: usize,
    /// Where samples, metrics, plots and weights are written
    pub output_dir: PathBuf,
    /// Seed for noise and weight initialization
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            optimizer: AdamParams::default(),
            print_every: 300,
            sample_size: 16,
            label_smoothing: false,
            checkpoint_every: 10,
            output_dir: PathBuf::from("output"),
            seed: None,
        }
    }
}

/// Losses and discriminator accuracies of one training step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepLosses {
    pub d_loss: f64,
    pub g_loss: f64,
    /// Fraction of real images classified as real
    pub real_acc: f64,
    /// Fraction of generated images classified as fake
    pub fake_acc: f64,
}

impl StepLosses {
    pub fn is_finite(&self) -> bool {
        self.d_loss.is_finite() && self.g_loss.is_finite()
    }
}

/// One discriminator update followed by one generator update
///
/// # Arguments
///
/// * `model` - DCGAN being trained
/// * `real_images` - Real batch, already scaled to [-1, 1]
/// * `gen_opt` - Optimizer over the generator's parameters
/// * `disc_opt` - Optimizer over the discriminator's parameters
/// * `smooth` - Apply label smoothing to the real targets
pub fn train_step(
    model: &DCGAN,
    real_images: &Tensor,
    gen_opt: &mut nn::Optimizer,
    disc_opt: &mut nn::Optimizer,
    smooth: bool,
) -> Result<StepLosses> {
    let batch_size = real_images.size()[0];

    // ========== Train Discriminator ==========
    let real_output = model.discriminator.forward_t(real_images, true);

    let fake_images = model.generator.forward_t(&model.noise(batch_size), true);
    let fake_output = model.discriminator.forward_t(&fake_images.detach(), true);

    let d_loss = discriminator_loss(&real_output, &fake_output, smooth);
    disc_opt.zero_grad();
    d_loss.backward();
    disc_opt.step();

    // a logit >= 0 is a sigmoid >= 0.5
    let real_acc = real_output.ge(0.0).to_kind(Kind::Float).mean(Kind::Float).f_double_value(&[])?;
    let fake_acc = fake_output.lt(0.0).to_kind(Kind::Float).mean(Kind::Float).f_double_value(&[])?;

    // ========== Train Generator ==========
    let fake_images = model.generator.forward_t(&model.noise(batch_size), true);
    let g_loss = generator_loss(&model.discriminator.forward_t(&fake_images, true));

    gen_opt.zero_grad();
    g_loss.backward();
    gen_opt.step();

    Ok(StepLosses {
        d_loss: d_loss.f_double_value(&[])?,
        g_loss: g_loss.f_double_value(&[])?,
        real_acc,
        fake_acc,
    })
}

/// DCGAN Trainer
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    metrics: TrainingMetrics,
    samples: Vec<Tensor>,
    /// Epoch (1-based) of `samples[0]`
    first_sample_epoch: usize,
    start_epoch: usize,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: TrainingConfig, device: Device) -> Self {
        Self {
            config,
            device,
            metrics: TrainingMetrics::new(),
            samples: Vec::new(),
            first_sample_epoch: 1,
            start_epoch: 0,
        }
    }

    /// Continue a previous run after `epoch` completed epochs
    ///
    /// Samples already written to the output directory are picked up so the
    /// final sample file covers the whole run. Without them the sample file
    /// starts at epoch `epoch + 1`.
    pub fn resume(&mut self, epoch: usize, metrics: TrainingMetrics) -> Result<()> {
        let samples_path = self.output_path(SAMPLES_FILE);
        let mut samples = if samples_path.exists() {
            load_samples(&samples_path)?
        } else {
            Vec::new()
        };

        if samples.len() >= epoch {
            samples.truncate(epoch);
            self.samples = samples;
            self.first_sample_epoch = 1;
        } else {
            warn!(
                "{} holds {} of {} earlier epochs of samples, saved samples start at epoch {}",
                samples_path.display(),
                samples.len(),
                epoch,
                epoch + 1
            );
            self.samples = Vec::new();
            self.first_sample_epoch = epoch + 1;
        }

        self.start_epoch = epoch;
        self.metrics = metrics;
        info!("Resuming after epoch {}", epoch);
        Ok(())
    }

    /// Train the DCGAN model
    ///
    /// # Arguments
    ///
    /// * `model` - DCGAN model to train
    /// * `data_loader` - DataLoader providing training batches
    ///
    /// # Returns
    ///
    /// Training metrics
    pub fn train(&mut self, model: &mut DCGAN, data_loader: &mut DataLoader) -> Result<&TrainingMetrics> {
        let num_batches = data_loader.num_batches();
        if num_batches == 0 {
            bail!("data loader yields no batches");
        }
        if self.config.print_every == 0 {
            bail!("print_every must be > 0");
        }
        if self.start_epoch >= self.config.epochs {
            info!("Already trained for {} epochs, nothing to do", self.start_epoch);
            return Ok(&self.metrics);
        }

        std::fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("creating {}", self.config.output_dir.display()))?;

        if let Some(seed) = self.config.seed {
            tch::manual_seed(seed as i64);
        }

        let mut gen_opt = model.gen_optimizer(&self.config.optimizer)?;
        let mut disc_opt = model.disc_optimizer(&self.config.optimizer)?;
        let fixed_noise = self.fixed_noise(model)?;

        info!(
            "Starting training for {} epochs, {} batches per epoch",
            self.config.epochs - self.start_epoch,
            num_batches
        );

        for epoch in self.start_epoch..self.config.epochs {
            let epoch_num = epoch + 1;
            let mut totals = StepLosses::default();
            let mut batch_count = 0usize;

            let pb = ProgressBar::new(num_batches as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                    .progress_chars("##-"),
            );

            for (batch_i, batch) in data_loader.iter().enumerate() {
                let real_images = scale(&batch.to_tensor(self.device)?, FeatureRange::default());
                let step = train_step(
                    model,
                    &real_images,
                    &mut gen_opt,
                    &mut disc_opt,
                    self.config.label_smoothing,
                )?;

                if !step.is_finite() {
                    pb.abandon();
                    bail!(
                        "non-finite loss at epoch {} batch {} (d_loss={}, g_loss={})",
                        epoch_num,
                        batch_i,
                        step.d_loss,
                        step.g_loss
                    );
                }

                totals.d_loss += step.d_loss;
                totals.g_loss += step.g_loss;
                totals.real_acc += step.real_acc;
                totals.fake_acc += step.fake_acc;
                batch_count += 1;

                if batch_i % self.config.print_every == 0 {
                    self.metrics.record_losses(epoch_num, batch_i, step.d_loss, step.g_loss);
                    pb.suspend(|| {
                        info!(
                            "Epoch [{:5}/{:5}] | d_loss: {:6.4} | g_loss: {:6.4}",
                            epoch_num, self.config.epochs, step.d_loss, step.g_loss
                        )
                    });
                }

                pb.set_message(format!("D: {:.4}, G: {:.4}", step.d_loss, step.g_loss));
                pb.inc(1);
            }

            pb.finish_and_clear();

            let n = batch_count as f64;
            let (avg_gen, avg_disc) = (totals.g_loss / n, totals.d_loss / n);
            let (avg_real, avg_fake) = (totals.real_acc / n, totals.fake_acc / n);
            self.metrics.record_epoch(avg_gen, avg_disc, avg_real, avg_fake);

            debug!(
                "Epoch {}/{}: G_loss={:.4}, D_loss={:.4}, Real_acc={:.2}%, Fake_acc={:.2}%",
                epoch_num,
                self.config.epochs,
                avg_gen,
                avg_disc,
                avg_real * 100.0,
                avg_fake * 100.0
            );

            if self.metrics.check_mode_collapse(COLLAPSE_WINDOW) {
                warn!("Possible mode collapse detected! Consider adjusting learning rates.");
            }

            self.samples
                .push(model.generate_from_noise(&fixed_noise).to_device(Device::Cpu));

            if self.config.checkpoint_every > 0 && epoch_num % self.config.checkpoint_every == 0 {
                self.checkpoint(model, epoch_num);
            }
        }

        self.finish(model)?;
        Ok(&self.metrics)
    }

    /// Load the fixed noise of an earlier run, or draw and store a new one
    fn fixed_noise(&self, model: &DCGAN) -> Result<Tensor> {
        let path = self.output_path(FIXED_NOISE_FILE);
        let expected = vec![self.config.sample_size, model.latent_dim()];

        if path.exists() {
            let noise = Tensor::load(&path).with_context(|| format!("loading {}", path.display()))?;
            if noise.size() == expected {
                return Ok(noise.to_device(model.device));
            }
            warn!("Ignoring {} with shape {:?}", path.display(), noise.size());
        }

        let noise = model.noise(self.config.sample_size);
        noise.save(&path).with_context(|| format!("saving {}", path.display()))?;
        Ok(noise)
    }

    fn checkpoint(&self, model: &DCGAN, epoch: usize) {
        let dir = self.output_path(CHECKPOINT_DIR);
        if let Err(e) = save_checkpoint(model, &self.metrics, epoch, &dir) {
            warn!("Failed to save checkpoint: {:#}", e);
        }
        if let Err(e) = save_samples(&self.samples, self.first_sample_epoch, self.output_path(SAMPLES_FILE)) {
            warn!("Failed to save samples: {:#}", e);
        }
    }

    /// Write every end-of-training artifact to the output directory
    fn finish(&self, model: &DCGAN) -> Result<()> {
        save_samples(&self.samples, self.first_sample_epoch, self.output_path(SAMPLES_FILE))?;
        self.metrics.save_losses_csv(self.output_path(LOSSES_FILE))?;
        self.metrics.save_epochs_csv(self.output_path(EPOCHS_FILE))?;
        plot_losses(&self.metrics.losses, self.output_path(LOSS_PLOT_FILE))?;

        if let Some(last) = self.samples.last() {
            save_image_grid(
                last,
                GRID_COLUMNS,
                FeatureRange::default(),
                GRID_UPSCALE,
                self.output_path(LAST_GRID_FILE),
            )?;
        }

        model.save(
            self.output_path(GENERATOR_FINAL_FILE),
            self.output_path(DISCRIMINATOR_FINAL_FILE),
        )?;

        info!("Training outputs written to {}", self.config.output_dir.display());
        Ok(())
    }

    fn output_path<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.config.output_dir.join(name)
    }

    /// Get training metrics
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Samples generated from the fixed noise, one batch per epoch
    pub fn samples(&self) -> &[Tensor] {
        &self.samples
    }

    /// Epoch (1-based) the first entry of [`samples`](Trainer::samples) belongs to
    pub fn first_sample_epoch(&self) -> usize {
        self.first_sample_epoch
    }

    /// Get configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SvhnDataset, IMAGE_BYTES};
    use crate::utils::find_latest_checkpoint;

    fn tiny_loader(count: usize, batch_size: usize) -> DataLoader {
        let images = (0..count * IMAGE_BYTES).map(|i| (i % 251) as u8).collect();
        let labels = (0..count).map(|i| (i % 10) as u8).collect();
        let dataset = SvhnDataset::from_raw(images, labels).unwrap();
        DataLoader::new(dataset, batch_size, true, false, Some(3))
    }

    fn tiny_config(dir: &Path, epochs: usize) -> TrainingConfig {
        TrainingConfig {
            epochs,
            print_every: 1,
            sample_size: 4,
            checkpoint_every: 1,
            output_dir: dir.to_path_buf(),
            seed: Some(11),
            ..Default::default()
        }
    }

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 50);
        assert_eq!(config.print_every, 300);
        assert_eq!(config.sample_size, 16);
        assert!(!config.label_smoothing);
    }

    #[test]
    fn test_train_step_losses_are_finite() {
        tch::manual_seed(0);
        let model = DCGAN::with_defaults(16, 4, Device::Cpu);
        let mut gen_opt = model.gen_optimizer(&AdamParams::default()).unwrap();
        let mut disc_opt = model.disc_optimizer(&AdamParams::default()).unwrap();

        let real = Tensor::rand([6, 3, 32, 32], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let step = train_step(&model, &real, &mut gen_opt, &mut disc_opt, true).unwrap();

        assert!(step.is_finite());
        assert!(step.d_loss > 0.0 && step.g_loss > 0.0);
        assert!((0.0..=1.0).contains(&step.real_acc));
        assert!((0.0..=1.0).contains(&step.fake_acc));
    }

    #[test]
    fn test_train_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = DCGAN::with_defaults(16, 4, Device::Cpu);
        let mut loader = tiny_loader(10, 4);

        let mut trainer = Trainer::new(tiny_config(dir.path(), 2), Device::Cpu);
        let metrics = trainer.train(&mut model, &mut loader).unwrap();

        assert_eq!(metrics.num_epochs(), 2);
        // 3 batches per epoch, every one logged
        assert_eq!(metrics.losses.len(), 6);
        assert_eq!(trainer.samples().len(), 2);
        assert_eq!(trainer.samples()[0].size(), vec![4, 3, 32, 32]);

        for name in [
            SAMPLES_FILE,
            FIXED_NOISE_FILE,
            LOSSES_FILE,
            EPOCHS_FILE,
            LOSS_PLOT_FILE,
            LAST_GRID_FILE,
            GENERATOR_FINAL_FILE,
            DISCRIMINATOR_FINAL_FILE,
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
        assert_eq!(load_samples(dir.path().join(SAMPLES_FILE)).unwrap().len(), 2);
    }

    #[test]
    fn test_resume_continues_sample_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = DCGAN::with_defaults(16, 4, Device::Cpu);
        let mut loader = tiny_loader(8, 4);

        Trainer::new(tiny_config(dir.path(), 1), Device::Cpu)
            .train(&mut model, &mut loader)
            .unwrap();

        let checkpoint = find_latest_checkpoint(dir.path().join(CHECKPOINT_DIR)).unwrap();
        let mut restored = DCGAN::with_defaults(16, 4, Device::Cpu);
        let (epoch, metrics) = crate::utils::load_checkpoint(&mut restored, &checkpoint).unwrap();
        assert_eq!(epoch, 1);

        let mut trainer = Trainer::new(tiny_config(dir.path(), 3), Device::Cpu);
        trainer.resume(epoch, metrics).unwrap();
        trainer.train(&mut restored, &mut loader).unwrap();

        assert_eq!(trainer.metrics().num_epochs(), 3);
        assert_eq!(load_samples(dir.path().join(SAMPLES_FILE)).unwrap().len(), 3);
    }

    #[test]
    fn test_resume_without_sample_file_offsets_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = DCGAN::with_defaults(16, 4, Device::Cpu);
        let mut loader = tiny_loader(4, 4);

        let config = TrainingConfig {
            checkpoint_every: 0,
            ..tiny_config(dir.path(), 4)
        };
        let mut trainer = Trainer::new(config, Device::Cpu);
        trainer.resume(2, TrainingMetrics::new()).unwrap();
        assert_eq!(trainer.first_sample_epoch(), 3);

        trainer.train(&mut model, &mut loader).unwrap();
        assert_eq!(trainer.samples().len(), 2);

        let mut names: Vec<String> = Tensor::load_multi(dir.path().join(SAMPLES_FILE))
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["epoch_0003", "epoch_0004"]);
    }

    #[test]
    fn test_non_finite_loss_aborts_with_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = DCGAN::with_defaults(16, 4, Device::Cpu);
        tch::no_grad(|| {
            for (_, mut var) in model.gen_vs.variables() {
                let _ = var.fill_(f64::NAN);
            }
        });
        let mut loader = tiny_loader(8, 4);

        let mut trainer = Trainer::new(tiny_config(dir.path(), 1), Device::Cpu);
        let err = trainer.train(&mut model, &mut loader).unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("non-finite loss"), "{}", message);
        assert!(message.contains("epoch 1 batch 0"), "{}", message);
        assert!(!dir.path().join(SAMPLES_FILE).exists());
    }

    #[test]
    fn test_zero_print_every_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = DCGAN::with_defaults(16, 4, Device::Cpu);
        let mut loader = tiny_loader(4, 4);

        let config = TrainingConfig {
            print_every: 0,
            ..tiny_config(dir.path(), 1)
        };
        let mut trainer = Trainer::new(config, Device::Cpu);
        assert!(trainer.train(&mut model, &mut loader).is_err());
    }

    #[test]
    fn test_empty_loader_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = DCGAN::with_defaults(16, 4, Device::Cpu);
        let dataset = SvhnDataset::from_raw(vec![], vec![]).unwrap();
        let mut loader = DataLoader::new(dataset, 4, false, false, None);

        let mut trainer = Trainer::new(tiny_config(dir.path(), 1), Device::Cpu);
        assert!(trainer.train(&mut model, &mut loader).is_err());
    }
}
