//! Training metrics for monitoring GAN progress
//!
//! Two granularities are tracked:
//! - a loss log sampled every `print_every` batches (what the loss plot shows)
//! - per-epoch averages of losses and discriminator accuracy

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One logged (discriminator, generator) loss pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    /// 1-based epoch
    pub epoch: usize,
    /// 0-based batch index within the epoch
    pub batch: usize,
    pub d_loss: f64,
    pub g_loss: f64,
}

/// Metrics collected during training
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Sampled loss pairs
    pub losses: Vec<LossRecord>,
    /// Generator losses per epoch
    pub gen_losses: Vec<f64>,
    /// Discriminator losses per epoch
    pub disc_losses: Vec<f64>,
    /// Discriminator accuracy on real samples
    pub disc_real_acc: Vec<f64>,
    /// Discriminator accuracy on fake samples
    pub disc_fake_acc: Vec<f64>,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sampled loss pair
    pub fn record_losses(&mut self, epoch: usize, batch: usize, d_loss: f64, g_loss: f64) {
        self.losses.push(LossRecord {
            epoch,
            batch,
            d_loss,
            g_loss,
        });
    }

    /// Record epoch metrics
    pub fn record_epoch(&mut self, gen_loss: f64, disc_loss: f64, real_acc: f64, fake_acc: f64) {
        self.gen_losses.push(gen_loss);
        self.disc_losses.push(disc_loss);
        self.disc_real_acc.push(real_acc);
        self.disc_fake_acc.push(fake_acc);
    }

    /// Get number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.gen_losses.len()
    }

    pub fn latest_gen_loss(&self) -> Option<f64> {
        self.gen_losses.last().copied()
    }

    pub fn latest_disc_loss(&self) -> Option<f64> {
        self.disc_losses.last().copied()
    }

    /// Moving average of the last `window` epoch generator losses
    pub fn gen_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.gen_losses, window)
    }

    /// Moving average of the last `window` epoch discriminator losses
    pub fn disc_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.disc_losses, window)
    }

    /// Check if training appears to have collapsed
    ///
    /// Mode collapse indicators:
    /// - Discriminator loss very low (can easily distinguish)
    /// - Generator loss very high (can't fool discriminator)
    pub fn check_mode_collapse(&self, window: usize) -> bool {
        if self.num_epochs() < window {
            return false;
        }

        self.disc_loss_ma(window) < 0.1 && self.gen_loss_ma(window) > 5.0
    }

    /// Check if training is balanced
    ///
    /// Neither network should dominate: discriminator accuracy on both real
    /// and fake images stays within 30-90%.
    pub fn is_balanced(&self, window: usize) -> bool {
        if self.num_epochs() < window {
            return true;
        }

        let avg_real = moving_average(&self.disc_real_acc, window);
        let avg_fake = moving_average(&self.disc_fake_acc, window);

        (0.3..0.9).contains(&avg_real) && (0.3..0.9).contains(&avg_fake)
    }

    /// Save per-epoch metrics to CSV
    pub fn save_epochs_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

        writer.write_record(["epoch", "gen_loss", "disc_loss", "real_acc", "fake_acc"])?;

        for i in 0..self.num_epochs() {
            writer.write_record([
                (i + 1).to_string(),
                self.gen_losses[i].to_string(),
                self.disc_losses[i].to_string(),
                self.disc_real_acc[i].to_string(),
                self.disc_fake_acc[i].to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Save the sampled loss log to CSV
    pub fn save_losses_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

        for record in &self.losses {
            writer.serialize(record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load metrics written by [`save_epochs_csv`] and [`save_losses_csv`]
    ///
    /// Either file may be missing; the corresponding series stays empty.
    ///
    /// [`save_epochs_csv`]: TrainingMetrics::save_epochs_csv
    /// [`save_losses_csv`]: TrainingMetrics::save_losses_csv
    pub fn load_csv<P: AsRef<Path>>(epochs_path: P, losses_path: P) -> Result<Self> {
        let mut metrics = Self::new();

        if epochs_path.as_ref().exists() {
            let mut reader = csv::Reader::from_path(&epochs_path)?;
            for result in reader.records() {
                let record = result?;
                metrics.gen_losses.push(record[1].parse()?);
                metrics.disc_losses.push(record[2].parse()?);
                metrics.disc_real_acc.push(record[3].parse()?);
                metrics.disc_fake_acc.push(record[4].parse()?);
            }
        }

        if losses_path.as_ref().exists() {
            metrics.losses = load_loss_log(losses_path)?;
        }

        Ok(metrics)
    }
}

/// Read a loss log CSV written by [`TrainingMetrics::save_losses_csv`]
pub fn load_loss_log<P: AsRef<Path>>(path: P) -> Result<Vec<LossRecord>> {
    let path = path.as_ref();
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;

    let records = reader.deserialize().collect::<std::result::Result<Vec<LossRecord>, _>>()?;
    Ok(records)
}

/// Calculate moving average of last `window` values
fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_metrics() {
        let mut metrics = TrainingMetrics::new();

        metrics.record_epoch(1.5, 0.8, 0.6, 0.7);
        metrics.record_epoch(1.3, 0.75, 0.65, 0.68);

        assert_eq!(metrics.num_epochs(), 2);
        assert_eq!(metrics.latest_gen_loss(), Some(1.3));
        assert!((metrics.gen_loss_ma(2) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_mode_collapse_detection() {
        let mut metrics = TrainingMetrics::new();
        for _ in 0..3 {
            metrics.record_epoch(7.0, 0.01, 1.0, 1.0);
        }

        assert!(!metrics.check_mode_collapse(5));
        assert!(metrics.check_mode_collapse(3));
        assert!(!metrics.is_balanced(3));
    }

    #[test]
    fn test_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let epochs = dir.path().join("epochs.csv");
        let losses = dir.path().join("losses.csv");

        let mut metrics = TrainingMetrics::new();
        metrics.record_losses(1, 0, 1.25, 0.75);
        metrics.record_losses(1, 300, 1.0, 1.5);
        metrics.record_epoch(1.1, 1.2, 0.5, 0.6);

        metrics.save_epochs_csv(&epochs).unwrap();
        metrics.save_losses_csv(&losses).unwrap();

        let loaded = TrainingMetrics::load_csv(&epochs, &losses).unwrap();
        assert_eq!(loaded.losses, metrics.losses);
        assert_eq!(loaded.disc_losses, vec![1.2]);
    }

    #[test]
    fn test_load_missing_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded =
            TrainingMetrics::load_csv(dir.path().join("a.csv"), dir.path().join("b.csv")).unwrap();

        assert_eq!(loaded.num_epochs(), 0);
        assert!(loaded.losses.is_empty());
    }
}
