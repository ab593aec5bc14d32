//! Convolution building blocks shared by both networks
//!
//! Each block is a bias-free (transposed) convolution optionally followed by
//! batch normalization. Activations are applied by the owning network.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

/// Strided convolution + optional batch norm
#[derive(Debug)]
pub struct ConvBlock {
    conv: nn::Conv2D,
    bn: Option<nn::BatchNorm>,
}

/// Build a convolution block
///
/// # Arguments
///
/// * `vs` - Variable path the block's parameters live under
/// * `in_channels` / `out_channels` - Channel counts
/// * `kernel_size` - Square kernel size (4 in the DCGAN setup)
/// * `stride` / `padding` - Convolution geometry
/// * `batch_norm` - Whether to append a BatchNorm2d layer
pub fn conv(
    vs: &nn::Path,
    in_channels: i64,
    out_channels: i64,
    kernel_size: i64,
    stride: i64,
    padding: i64,
    batch_norm: bool,
) -> ConvBlock {
    let config = nn::ConvConfig {
        stride,
        padding,
        bias: false,
        ..Default::default()
    };

    let conv = nn::conv2d(vs / "conv", in_channels, out_channels, kernel_size, config);
    let bn = batch_norm.then(|| nn::batch_norm2d(vs / "bn", out_channels, Default::default()));

    ConvBlock { conv, bn }
}

impl ModuleT for ConvBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let x = self.conv.forward(xs);
        match &self.bn {
            Some(bn) => bn.forward_t(&x, train),
            None => x,
        }
    }
}

/// Transposed convolution + optional batch norm
#[derive(Debug)]
pub struct DeconvBlock {
    deconv: nn::ConvTranspose2D,
    bn: Option<nn::BatchNorm>,
}

/// Build a transposed-convolution block
///
/// Same arguments as [`conv`]; with kernel 4, stride 2 and padding 1 the
/// spatial size doubles.
pub fn deconv(
    vs: &nn::Path,
    in_channels: i64,
    out_channels: i64,
    kernel_size: i64,
    stride: i64,
    padding: i64,
    batch_norm: bool,
) -> DeconvBlock {
    let config = nn::ConvTransposeConfig {
        stride,
        padding,
        bias: false,
        ..Default::default()
    };

    let deconv = nn::conv_transpose2d(vs / "deconv", in_channels, out_channels, kernel_size, config);
    let bn = batch_norm.then(|| nn::batch_norm2d(vs / "bn", out_channels, Default::default()));

    DeconvBlock { deconv, bn }
}

impl ModuleT for DeconvBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let x = self.deconv.forward(xs);
        match &self.bn {
            Some(bn) => bn.forward_t(&x, train),
            None => x,
        }
    }
}

/// Leaky ReLU with an explicit negative slope
///
/// For slopes below one this is `max(x, slope * x)`.
pub fn leaky_relu(xs: &Tensor, slope: f64) -> Tensor {
    xs.maximum(&(xs * slope))
}
