//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Per-epoch sample persistence
//! - Image grid and loss plot rendering

mod checkpoint;
mod config;
mod samples;
mod visualize;

pub use checkpoint::{
    find_latest_checkpoint, generator_path, list_checkpoints, load_checkpoint, load_checkpoint_meta,
    save_checkpoint, CheckpointMeta,
};
pub use config::{Config, DataConfig, ModelConfig, TrainingConfigFile};
pub use samples::{load_samples, sample_name, save_samples, select_epoch};
pub use visualize::{image_grid, plot_losses, save_image_grid, DISC_COLOUR, GEN_COLOUR};
