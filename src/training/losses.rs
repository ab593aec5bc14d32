//! Loss functions for GAN training
//!
//! All losses are binary cross entropy on raw discriminator logits; the
//! sigmoid is folded into the loss for numerical stability.

use tch::{Reduction, Tensor};

/// Target used for real images when label smoothing is on
pub const SMOOTH_REAL_LABEL: f64 = 0.9;

fn bce_with_logits(logits: &Tensor, target: f64) -> Tensor {
    let targets = Tensor::full_like(logits, target);
    logits.binary_cross_entropy_with_logits::<Tensor>(&targets, None, None, Reduction::Mean)
}

/// Loss for outputs that should be classified as real
///
/// # Arguments
///
/// * `d_out` - Discriminator logits, shape (batch_size, 1)
/// * `smooth` - Use 0.9 instead of 1.0 as the target
///
/// # Returns
///
/// Scalar loss tensor
pub fn real_loss(d_out: &Tensor, smooth: bool) -> Tensor {
    let target = if smooth { SMOOTH_REAL_LABEL } else { 1.0 };
    bce_with_logits(d_out, target)
}

/// Loss for outputs that should be classified as fake (target 0)
pub fn fake_loss(d_out: &Tensor) -> Tensor {
    bce_with_logits(d_out, 0.0)
}

/// Discriminator loss: real loss on real images plus fake loss on generated ones
///
/// # Arguments
///
/// * `real_output` - Discriminator logits on real images
/// * `fake_output` - Discriminator logits on generated images
/// * `smooth` - Apply label smoothing to the real targets
pub fn discriminator_loss(real_output: &Tensor, fake_output: &Tensor, smooth: bool) -> Tensor {
    real_loss(real_output, smooth) + fake_loss(fake_output)
}

/// Generator loss: the real loss on generated images (flipped labels)
///
/// The generator wants the discriminator to output "real" for its images.
pub fn generator_loss(fake_output: &Tensor) -> Tensor {
    real_loss(fake_output, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_losses_are_scalar_and_non_negative() {
        tch::manual_seed(0);
        for _ in 0..10 {
            let logits = Tensor::randn([16, 1], (Kind::Float, Device::Cpu)) * 20.0;

            for loss in [
                real_loss(&logits, false),
                real_loss(&logits, true),
                fake_loss(&logits),
                generator_loss(&logits),
            ] {
                assert_eq!(loss.size(), Vec::<i64>::new());
                assert!(loss.double_value(&[]) >= 0.0);
            }
        }
    }

    #[test]
    fn test_zero_logit_losses() {
        let logits = Tensor::zeros([4, 1], (Kind::Float, Device::Cpu));
        let ln2 = std::f64::consts::LN_2;

        assert!((real_loss(&logits, false).double_value(&[]) - ln2).abs() < 1e-5);
        assert!((fake_loss(&logits).double_value(&[]) - ln2).abs() < 1e-5);
        assert!((discriminator_loss(&logits, &logits, false).double_value(&[]) - 2.0 * ln2).abs() < 1e-5);
    }

    #[test]
    fn test_perfect_discriminator() {
        let real_output = Tensor::full([4, 1], 10.0, (Kind::Float, Device::Cpu));
        let fake_output = Tensor::full([4, 1], -10.0, (Kind::Float, Device::Cpu));

        let loss = discriminator_loss(&real_output, &fake_output, false);
        assert!(loss.double_value(&[]) < 0.1);

        // a confident discriminator makes the generator's job hard
        assert!(generator_loss(&fake_output).double_value(&[]) > 5.0);
    }

    #[test]
    fn test_smoothing_penalizes_overconfidence() {
        let confident = Tensor::full([4, 1], 10.0, (Kind::Float, Device::Cpu));

        let hard = real_loss(&confident, false).double_value(&[]);
        let smooth = real_loss(&confident, true).double_value(&[]);
        assert!(smooth > hard);
    }
}
