//! # DCGAN for Street View House Numbers
//!
//! This crate provides a modular implementation of a Deep Convolutional Generative
//! Adversarial Network (DCGAN) that learns to generate 32x32 color images of
//! house-number digits from the SVHN dataset.
//!
//! ## Modules
//!
//! - `data`: SVHN download, MATLAB file parsing, scaling and batching
//! - `model`: DCGAN architecture (Generator and Discriminator)
//! - `training`: Training loop, loss functions and metrics
//! - `utils`: Configuration, checkpoints, sample files and rendering

pub mod data;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{scale, unscale, DataLoader, FeatureRange, Split, SvhnClient, SvhnDataset};
pub use model::{Discriminator, Generator, DCGAN};
pub use training::{Trainer, TrainingConfig, TrainingMetrics};
pub use utils::{load_checkpoint, save_checkpoint, Config};
