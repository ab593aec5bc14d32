//! Training module for DCGAN
//!
//! This module provides:
//! - Training loop implementation
//! - Loss functions (Binary Cross Entropy on logits)
//! - Training configuration and metrics

mod losses;
mod metrics;
mod trainer;

pub use losses::{discriminator_loss, fake_loss, generator_loss, real_loss, SMOOTH_REAL_LABEL};
pub use metrics::{load_loss_log, LossRecord, TrainingMetrics};
pub use trainer::{train_step, StepLosses, Trainer, TrainingConfig};
pub use trainer::{
    CHECKPOINT_DIR, DISCRIMINATOR_FINAL_FILE, EPOCHS_FILE, FIXED_NOISE_FILE, GENERATOR_FINAL_FILE,
    LAST_GRID_FILE, LOSSES_FILE, LOSS_PLOT_FILE, SAMPLES_FILE,
};
