//! Checkpoint save/load utilities
//!
//! A checkpoint is a directory `checkpoint_epoch_NNNN` holding both networks'
//! weights, a `meta.json` description and the metrics recorded so far.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::DCGAN;
use crate::training::TrainingMetrics;

const CHECKPOINT_PREFIX: &str = "checkpoint_epoch_";
const GENERATOR_FILE: &str = "generator.ot";
const DISCRIMINATOR_FILE: &str = "discriminator.ot";
const META_FILE: &str = "meta.json";
const EPOCHS_FILE: &str = "epochs.csv";
const LOSSES_FILE: &str = "losses.csv";

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Number of completed epochs
    pub epoch: usize,
    /// Generator loss at checkpoint
    pub gen_loss: f64,
    /// Discriminator loss at checkpoint
    pub disc_loss: f64,
    /// Timestamp of checkpoint (RFC 3339)
    pub timestamp: String,
    /// Latent vector size the generator was built with
    pub latent_dim: i64,
    /// Base channel width of both networks
    pub conv_dim: i64,
}

/// Path of the generator weights inside a checkpoint directory
pub fn generator_path<P: AsRef<Path>>(checkpoint_dir: P) -> PathBuf {
    checkpoint_dir.as_ref().join(GENERATOR_FILE)
}

/// Save a complete checkpoint (model + metadata + metrics)
///
/// # Arguments
///
/// * `model` - DCGAN model to save
/// * `metrics` - Training metrics
/// * `epoch` - Number of completed epochs
/// * `dir` - Directory under which the checkpoint directory is created
///
/// # Returns
///
/// Path to saved checkpoint
pub fn save_checkpoint<P: AsRef<Path>>(
    model: &DCGAN,
    metrics: &TrainingMetrics,
    epoch: usize,
    dir: P,
) -> Result<PathBuf> {
    let checkpoint_dir = dir.as_ref().join(format!("{}{:04}", CHECKPOINT_PREFIX, epoch));
    std::fs::create_dir_all(&checkpoint_dir)
        .with_context(|| format!("creating {}", checkpoint_dir.display()))?;

    model.save(
        checkpoint_dir.join(GENERATOR_FILE),
        checkpoint_dir.join(DISCRIMINATOR_FILE),
    )?;

    let meta = CheckpointMeta {
        epoch,
        gen_loss: metrics.latest_gen_loss().unwrap_or(0.0),
        disc_loss: metrics.latest_disc_loss().unwrap_or(0.0),
        timestamp: chrono::Utc::now().to_rfc3339(),
        latent_dim: model.latent_dim(),
        conv_dim: model.conv_dim(),
    };
    std::fs::write(checkpoint_dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;

    metrics.save_epochs_csv(checkpoint_dir.join(EPOCHS_FILE))?;
    metrics.save_losses_csv(checkpoint_dir.join(LOSSES_FILE))?;

    tracing::info!("Saved checkpoint to {}", checkpoint_dir.display());
    Ok(checkpoint_dir)
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta<P: AsRef<Path>>(checkpoint_dir: P) -> Result<CheckpointMeta> {
    let meta_path = checkpoint_dir.as_ref().join(META_FILE);
    let content = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

/// Load a complete checkpoint
///
/// # Arguments
///
/// * `model` - DCGAN model to load weights into
/// * `checkpoint_dir` - Directory containing checkpoint
///
/// # Returns
///
/// Tuple of (completed epochs, metrics)
pub fn load_checkpoint<P: AsRef<Path>>(
    model: &mut DCGAN,
    checkpoint_dir: P,
) -> Result<(usize, TrainingMetrics)> {
    let checkpoint_dir = checkpoint_dir.as_ref();
    let meta = load_checkpoint_meta(checkpoint_dir)?;

    if meta.latent_dim != model.latent_dim() || meta.conv_dim != model.conv_dim() {
        anyhow::bail!(
            "checkpoint was built with latent_dim={} conv_dim={}, model has latent_dim={} conv_dim={}",
            meta.latent_dim,
            meta.conv_dim,
            model.latent_dim(),
            model.conv_dim()
        );
    }

    model.load(
        checkpoint_dir.join(GENERATOR_FILE),
        checkpoint_dir.join(DISCRIMINATOR_FILE),
    )?;

    let metrics = TrainingMetrics::load_csv(
        checkpoint_dir.join(EPOCHS_FILE),
        checkpoint_dir.join(LOSSES_FILE),
    )?;

    tracing::info!("Loaded checkpoint from {} (epoch {})", checkpoint_dir.display(), meta.epoch);
    Ok((meta.epoch, metrics))
}

fn checkpoint_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![];
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(CHECKPOINT_PREFIX))
                .unwrap_or(false)
        })
        .map(|e| e.path())
        .collect();

    dirs.sort();
    dirs
}

/// Find the latest checkpoint in a directory
pub fn find_latest_checkpoint<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
    checkpoint_dirs(dir.as_ref()).pop()
}

/// List all checkpoints in a directory, oldest first
pub fn list_checkpoints<P: AsRef<Path>>(dir: P) -> Vec<(PathBuf, CheckpointMeta)> {
    checkpoint_dirs(dir.as_ref())
        .into_iter()
        .filter_map(|path| load_checkpoint_meta(&path).ok().map(|meta| (path, meta)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_checkpoint_meta_serialization() {
        let meta = CheckpointMeta {
            epoch: 10,
            gen_loss: 0.5,
            disc_loss: 0.6,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            latent_dim: 100,
            conv_dim: 32,
        };

        let json = serde_json::to_string(&meta).unwrap();
        let loaded: CheckpointMeta = serde_json::from_str(&json).unwrap();

        assert_eq!(meta.epoch, loaded.epoch);
        assert_eq!(meta.conv_dim, loaded.conv_dim);
    }

    #[test]
    fn test_save_load_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        let model = DCGAN::with_defaults(16, 8, Device::Cpu);

        let mut metrics = TrainingMetrics::new();
        metrics.record_losses(1, 0, 1.3, 0.8);
        metrics.record_epoch(0.9, 1.2, 0.55, 0.6);

        save_checkpoint(&model, &metrics, 1, dir.path()).unwrap();
        metrics.record_epoch(1.0, 1.1, 0.6, 0.6);
        let second = save_checkpoint(&model, &metrics, 2, dir.path()).unwrap();

        assert_eq!(find_latest_checkpoint(dir.path()), Some(second.clone()));
        assert_eq!(list_checkpoints(dir.path()).len(), 2);

        let mut restored = DCGAN::with_defaults(16, 8, Device::Cpu);
        let (epoch, loaded) = load_checkpoint(&mut restored, &second).unwrap();
        assert_eq!(epoch, 2);
        assert_eq!(loaded.num_epochs(), 2);
        assert_eq!(loaded.losses.len(), 1);
    }

    #[test]
    fn test_load_rejects_mismatched_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let model = DCGAN::with_defaults(16, 8, Device::Cpu);
        let path = save_checkpoint(&model, &TrainingMetrics::new(), 1, dir.path()).unwrap();

        let mut wider = DCGAN::with_defaults(16, 16, Device::Cpu);
        assert!(load_checkpoint(&mut wider, &path).is_err());
    }

    #[test]
    fn test_find_latest_in_missing_dir() {
        assert!(find_latest_checkpoint("/nonexistent/checkpoints").is_none());
    }
}
