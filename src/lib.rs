//! Multi-label protein localization classifier.
//!
//! Training pipeline for fluorescence microscopy images from the Human
//! Protein Atlas: four stained channel images per sample, a ResNet-50
//! classifier with a sigmoid multi-label head, focal loss training over
//! seeded epoch permutations, and ordered CSV prediction output.
//!
//! The crate is organized as:
//! - [`config`]: run parameters with derived image dimensions
//! - [`dataset`]: labels, preprocessing, batch generation
//! - [`model`]: ResNet-50 backbone and classification head
//! - [`training`]: focal loss and the epoch trainer
//! - [`inference`]: ordered prediction over unlabeled images
//! - [`backend`]: compute backend selection
//! - [`utils`]: errors, logging, metrics

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use config::ModelParameter;
pub use utils::error::{AtlasError, Result};

/// Number of protein localization classes in the full dataset.
pub const NUM_CLASSES: usize = 28;

/// Side length of the raw channel images.
pub const RAW_IMAGE_SIZE: usize = 512;

/// Stained channels stored per sample, one grayscale PNG each.
pub const N_RAW_CHANNELS: usize = 4;

/// File name suffixes of the stained channels, in stacking order.
pub const CHANNEL_SUFFIXES: [&str; 4] = ["green", "blue", "red", "yellow"];

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
