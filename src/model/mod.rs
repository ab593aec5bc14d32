//! Model module containing GAN architecture components
//!
//! This module provides:
//! - Convolution building blocks
//! - Generator network for creating house-number images
//! - Discriminator network for distinguishing real from fake
//! - DCGAN wrapper combining both networks

mod dcgan;
mod discriminator;
mod generator;
pub mod layers;

pub use dcgan::{AdamParams, DCGAN};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{sample_noise, Generator, GeneratorConfig};
