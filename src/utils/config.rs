//! Configuration management
//!
//! Provides unified configuration for the entire DCGAN pipeline. Defaults
//! reproduce the reference SVHN recipe; a TOML or JSON file can override them.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::Split;
use crate::model::AdamParams;
use crate::training::TrainingConfig;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Training configuration
    pub training: TrainingConfigFile,
}

/// Data-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the `.mat` files
    pub root: String,
    /// Split to train on: "train", "test" or "extra"
    pub split: String,
    /// Batch size
    pub batch_size: usize,
    /// Reshuffle every epoch
    pub shuffle: bool,
    /// Drop the last incomplete batch
    pub drop_last: bool,
    /// Download the split if it is missing
    pub download: bool,
    /// Alternative mirror for the download
    pub mirror: Option<String>,
}

/// Model-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Latent dimension size
    pub latent_dim: i64,
    /// Base channel width of both networks
    pub conv_dim: i64,
}

/// Training-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfigFile {
    /// Number of epochs
    pub epochs: usize,
    /// Adam learning rate (both networks)
    pub lr: f64,
    /// Adam beta1
    pub beta1: f64,
    /// Adam beta2
    pub beta2: f64,
    /// Log losses every N batches
    pub print_every: usize,
    /// Number of fixed-noise samples generated per epoch
    pub sample_size: i64,
    /// Use 0.9 instead of 1.0 as the real target for the discriminator
    pub label_smoothing: bool,
    /// Checkpoint frequency in epochs (0 disables)
    pub checkpoint_every: usize,
    /// Directory for samples, metrics, plots and checkpoints
    pub output_dir: String,
    /// Device: "auto", "cpu" or "cuda"
    pub device: String,
    /// Seed for weights, noise and shuffling
    pub seed: Option<u64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: "data/SVHN".to_string(),
            split: "train".to_string(),
            batch_size: 128,
            shuffle: true,
            drop_last: false,
            download: true,
            mirror: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            latent_dim: 100,
            conv_dim: 32,
        }
    }
}

impl Default for TrainingConfigFile {
    fn default() -> Self {
        let adam = AdamParams::default();
        Self {
            epochs: 50,
            lr: adam.lr,
            beta1: adam.beta1,
            beta2: adam.beta2,
            print_every: 300,
            sample_size: 16,
            label_smoothing: false,
            checkpoint_every: 10,
            output_dir: "output".to_string(),
            device: "auto".to_string(),
            seed: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save configuration to TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save configuration to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load from a `.toml` or `.json` file, chosen by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        if is_toml(path.as_ref()) {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save to a `.toml` or `.json` file, chosen by extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if is_toml(path.as_ref()) {
            self.save_toml(path)
        } else {
            self.save_json(path)
        }
    }

    /// Resolve the configured device
    ///
    /// "auto" picks CUDA when available. An explicit "cuda" request on a
    /// machine without a GPU falls back to the CPU with a warning.
    pub fn device(&self) -> tch::Device {
        match self.training.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            "cpu" => tch::Device::Cpu,
            _ => tch::Device::cuda_if_available(),
        }
    }

    /// Parsed dataset split
    pub fn split(&self) -> Result<Split> {
        self.data.split.parse()
    }

    /// Adam hyperparameters
    pub fn adam(&self) -> AdamParams {
        AdamParams {
            lr: self.training.lr,
            beta1: self.training.beta1,
            beta2: self.training.beta2,
        }
    }

    /// Training loop configuration
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            epochs: self.training.epochs,
            optimizer: self.adam(),
            print_every: self.training.print_every,
            sample_size: self.training.sample_size,
            label_smoothing: self.training.label_smoothing,
            checkpoint_every: self.training.checkpoint_every,
            output_dir: PathBuf::from(&self.training.output_dir),
            seed: self.training.seed,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.data.batch_size == 0 {
            bail!("Batch size must be > 0");
        }
        self.split()?;
        if self.model.latent_dim <= 0 {
            bail!("Latent dimension must be > 0");
        }
        if self.model.conv_dim <= 0 {
            bail!("Base channel width must be > 0");
        }
        if self.training.epochs == 0 {
            bail!("Number of epochs must be > 0");
        }
        if self.training.lr <= 0.0 {
            bail!("Learning rate must be > 0");
        }
        if !(0.0..1.0).contains(&self.training.beta1) || !(0.0..1.0).contains(&self.training.beta2) {
            bail!("Adam betas must be in [0, 1)");
        }
        if self.training.print_every == 0 {
            bail!("print_every must be > 0");
        }
        if self.training.sample_size <= 0 {
            bail!("Sample size must be > 0");
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map(|ext| ext == "toml").unwrap_or(false)
}
