//! Persistence for the per-epoch generated samples
//!
//! Samples are stored as one named-tensor file. Each entry holds the fixed-noise
//! batch generated at the end of an epoch and is named `epoch_NNNN`, so the
//! list order survives a round trip.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tch::Tensor;

const PREFIX: &str = "epoch_";

/// Name under which the samples of `epoch` (1-based) are stored
pub fn sample_name(epoch: usize) -> String {
    format!("{}{:04}", PREFIX, epoch)
}

/// Write the per-epoch sample batches to `path`
///
/// `samples[i]` is stored as epoch `first_epoch + i`.
pub fn save_samples<P: AsRef<Path>>(samples: &[Tensor], first_epoch: usize, path: P) -> Result<()> {
    let path = path.as_ref();
    let named: Vec<(String, &Tensor)> = samples
        .iter()
        .enumerate()
        .map(|(i, t)| (sample_name(first_epoch + i), t))
        .collect();

    Tensor::save_multi(&named, path).with_context(|| format!("saving samples to {}", path.display()))?;
    Ok(())
}

/// Read per-epoch sample batches, ordered by epoch
pub fn load_samples<P: AsRef<Path>>(path: P) -> Result<Vec<Tensor>> {
    let path = path.as_ref();
    let mut named =
        Tensor::load_multi(path).with_context(|| format!("loading samples from {}", path.display()))?;

    if let Some((name, _)) = named.iter().find(|(name, _)| !name.starts_with(PREFIX)) {
        bail!("{} contains unexpected tensor `{}`", path.display(), name);
    }

    named.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(named.into_iter().map(|(_, tensor)| tensor).collect())
}

/// Pick one epoch's samples; negative indices count from the end (`-1` = last)
pub fn select_epoch(samples: &[Tensor], index: i64) -> Result<&Tensor> {
    let len = samples.len() as i64;
    let resolved = if index < 0 { len + index } else { index };

    if resolved < 0 || resolved >= len {
        bail!("epoch index {} out of range for {} saved epochs", index, len);
    }
    Ok(&samples[resolved as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_sample_name_sorts_numerically() {
        assert_eq!(sample_name(3), "epoch_0003");
        assert!(sample_name(9) < sample_name(10));
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train_samples.ot");

        let samples: Vec<Tensor> = (0..12)
            .map(|i| Tensor::full([2, 3, 32, 32], i as f64, (Kind::Float, Device::Cpu)))
            .collect();
        save_samples(&samples, 1, &path).unwrap();

        let loaded = load_samples(&path).unwrap();
        assert_eq!(loaded.len(), 12);
        for (i, tensor) in loaded.iter().enumerate() {
            assert_eq!(tensor.size(), vec![2, 3, 32, 32]);
            assert_eq!(tensor.double_value(&[0, 0, 0, 0]), i as f64);
        }
    }

    #[test]
    fn test_save_names_from_first_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train_samples.ot");
        let samples: Vec<Tensor> = (0..2).map(|i| Tensor::from_slice(&[i as f32])).collect();

        save_samples(&samples, 5, &path).unwrap();

        let mut names: Vec<String> = Tensor::load_multi(&path)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["epoch_0005", "epoch_0006"]);
    }

    #[test]
    fn test_select_epoch() {
        let samples: Vec<Tensor> = (0..3)
            .map(|i| Tensor::from_slice(&[i as f32]))
            .collect();

        assert_eq!(select_epoch(&samples, -1).unwrap().double_value(&[0]), 2.0);
        assert_eq!(select_epoch(&samples, 0).unwrap().double_value(&[0]), 0.0);
        assert!(select_epoch(&samples, 3).is_err());
        assert!(select_epoch(&samples, -4).is_err());
    }
}
