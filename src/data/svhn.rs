//! SVHN dataset in memory
//!
//! The dataset ships as MATLAB v5 files. `X` holds the images as a
//! column-major 32x32x3xN uint8 array and `y` the labels as an Nx1 array where
//! the digit zero is stored as 10.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use matfile::{MatFile, NumericData};
use tracing::{debug, info};

/// Image height and width in pixels
pub const IMAGE_SIZE: usize = 32;
/// Color channels per image
pub const CHANNELS: usize = 3;
/// Bytes per image in CHW layout
pub const IMAGE_BYTES: usize = CHANNELS * IMAGE_SIZE * IMAGE_SIZE;

/// Labeled house-number images, stored row-major as (N, C, H, W) bytes
#[derive(Debug, Clone)]
pub struct SvhnDataset {
    images: Vec<u8>,
    labels: Vec<u8>,
}

impl SvhnDataset {
    /// Build a dataset from CHW image bytes and labels
    pub fn from_raw(images: Vec<u8>, labels: Vec<u8>) -> Result<Self> {
        if images.len() % IMAGE_BYTES != 0 {
            bail!(
                "image buffer length {} is not a multiple of {}",
                images.len(),
                IMAGE_BYTES
            );
        }

        let count = images.len() / IMAGE_BYTES;
        if count != labels.len() {
            bail!("{} images but {} labels", count, labels.len());
        }

        Ok(Self { images, labels })
    }

    /// Load a `*_32x32.mat` file
    pub fn load_mat<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mat = MatFile::parse(BufReader::new(file))
            .map_err(|e| anyhow!("parsing {}: {:?}", path.display(), e))?;

        let x = mat
            .find_by_name("X")
            .ok_or_else(|| anyhow!("{} has no `X` variable", path.display()))?;
        let y = mat
            .find_by_name("y")
            .ok_or_else(|| anyhow!("{} has no `y` variable", path.display()))?;

        let dims = x.size();
        debug!("X dims {:?}, y dims {:?}", dims, y.size());
        if dims.len() != 4 || dims[0] != IMAGE_SIZE || dims[1] != IMAGE_SIZE || dims[2] != CHANNELS {
            bail!("unexpected X shape {:?}, expected [32, 32, 3, N]", dims);
        }

        let raw = as_bytes(x.data()).context("reading X")?;
        let images = hwcn_to_nchw(&raw, dims[3]);
        let labels = as_bytes(y.data())
            .context("reading y")?
            .into_iter()
            .map(|label| label % 10)
            .collect();

        let dataset = Self::from_raw(images, labels)?;
        info!("Loaded {} images from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// CHW bytes of image `index`
    pub fn image(&self, index: usize) -> &[u8] {
        let start = index * IMAGE_BYTES;
        &self.images[start..start + IMAGE_BYTES]
    }

    /// Digit label (0-9) of image `index`
    pub fn label(&self, index: usize) -> u8 {
        self.labels[index]
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

/// Reorder MATLAB column-major (H, W, C, N) data into row-major (N, C, H, W)
///
/// Column-major offset of (h, w, c, n) is h + H*(w + W*(c + C*n)), so each
/// image is already contiguous; only the h/w axes need swapping.
fn hwcn_to_nchw(raw: &[u8], count: usize) -> Vec<u8> {
    let mut out = vec![0u8; count * IMAGE_BYTES];
    let plane = IMAGE_SIZE * IMAGE_SIZE;

    for n in 0..count {
        for c in 0..CHANNELS {
            let base = n * IMAGE_BYTES + c * plane;
            for w in 0..IMAGE_SIZE {
                for h in 0..IMAGE_SIZE {
                    out[base + h * IMAGE_SIZE + w] = raw[base + w * IMAGE_SIZE + h];
                }
            }
        }
    }

    out
}

/// Flatten numeric MAT data into bytes
///
/// Labels are sometimes stored as doubles, images always as uint8.
fn as_bytes(data: &NumericData) -> Result<Vec<u8>> {
    match data {
        NumericData::UInt8 { real, .. } => Ok(real.clone()),
        NumericData::Double { real, .. } => Ok(real.iter().map(|&v| v as u8).collect()),
        NumericData::Single { real, .. } => Ok(real.iter().map(|&v| v as u8).collect()),
        NumericData::Int32 { real, .. } => Ok(real.iter().map(|&v| v as u8).collect()),
        _ => bail!("unsupported MAT element type"),
    }
}
