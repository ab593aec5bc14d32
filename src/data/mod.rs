//! Data module for fetching and preparing SVHN images
//!
//! This module provides:
//! - Download client for the SVHN mirror
//! - MATLAB file parsing into an in-memory dataset
//! - Pixel rescaling to the generator's output range
//! - DataLoader for shuffled mini-batches

mod client;
mod loader;
mod preprocessing;
mod svhn;

pub use client::{split_path, Split, SvhnClient};
pub use loader::{Batch, DataLoader};
pub use preprocessing::{scale, to_pixels, unscale, FeatureRange};
pub use svhn::{SvhnDataset, CHANNELS, IMAGE_BYTES, IMAGE_SIZE};
