//! Pixel rescaling utilities
//!
//! The generator ends in `tanh`, so its images live in [-1, 1]. Real images are
//! loaded in [0, 1] and have to be moved into the same range before they reach
//! the discriminator:
//!
//! - `scale`: [0, 1] -> feature range
//! - `unscale`: feature range -> [0, 1]
//! - `to_pixels`: feature range -> 0..=255 bytes for rendering

use tch::{Kind, Tensor};

/// Target range for scaled pixel values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl Default for FeatureRange {
    fn default() -> Self {
        Self { min: -1.0, max: 1.0 }
    }
}

impl FeatureRange {
    /// The range real images are stored in after loading
    pub const UNIT: FeatureRange = FeatureRange { min: 0.0, max: 1.0 };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the range
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Scale a tensor assumed to be in [0, 1] into `range`
///
/// Formula: x_scaled = x * (max - min) + min
pub fn scale(x: &Tensor, range: FeatureRange) -> Tensor {
    x * range.span() + range.min
}

/// Inverse of [`scale`]: map values in `range` back to [0, 1]
///
/// Formula: x = (x_scaled - min) / (max - min)
pub fn unscale(x: &Tensor, range: FeatureRange) -> Tensor {
    (x - range.min) / range.span()
}

/// Convert a tensor with values in `range` into 8-bit pixel values
///
/// Values outside the range are clamped and fractions truncated, so the
/// midpoint of the range maps to 127. The output follows the tensor's
/// element order.
pub fn to_pixels(x: &Tensor, range: FeatureRange) -> anyhow::Result<Vec<u8>> {
    let unit = unscale(x, range)
        .clamp(0.0, 1.0)
        .to_kind(Kind::Float)
        .to_device(tch::Device::Cpu)
        .contiguous()
        .view([-1]);

    let values: Vec<f32> = Vec::try_from(&unit)?;
    Ok(values.iter().map(|v| (v * 255.0) as u8).collect())
}

/// Convert raw bytes into [0, 1] floats
pub fn bytes_to_unit(bytes: &[u8]) -> impl Iterator<Item = f32> + '_ {
    bytes.iter().map(|&b| b as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_scale_maps_unit_interval_to_range() {
        let x = Tensor::from_slice(&[0.0f32, 0.5, 1.0]);
        let scaled = scale(&x, FeatureRange::default());
        let values: Vec<f32> = Vec::try_from(&scaled).unwrap();

        assert_eq!(values, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unscale_recovers_original() {
        tch::manual_seed(7);
        let x = Tensor::rand([4, 3, 32, 32], (Kind::Float, Device::Cpu));
        let range = FeatureRange::default();

        let restored = unscale(&scale(&x, range), range);
        let max_err = (&restored - &x).abs().max().double_value(&[]);

        assert!(max_err < 1e-6, "max error {}", max_err);
    }

    #[test]
    fn test_custom_range() {
        let x = Tensor::from_slice(&[0.0f32, 1.0]);
        let scaled = scale(&x, FeatureRange::new(-0.5, 2.0));
        let values: Vec<f32> = Vec::try_from(&scaled).unwrap();

        assert_eq!(values, vec![-0.5, 2.0]);
    }

    #[test]
    fn test_to_pixels_clamps() {
        let x = Tensor::from_slice(&[-2.0f32, -1.0, 0.0, 1.0, 3.0]);
        let pixels = to_pixels(&x, FeatureRange::default()).unwrap();

        assert_eq!(pixels, vec![0, 0, 127, 255, 255]);
    }

    #[test]
    fn test_bytes_to_unit() {
        let values: Vec<f32> = bytes_to_unit(&[0, 255]).collect();
        assert_eq!(values, vec![0.0, 1.0]);
    }
}
