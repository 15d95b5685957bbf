//! Model and Pipeline Configuration
//!
//! `ModelParameter` carries every knob shared between the preprocessing
//! pipeline, the batch generators and the model head. Scaled dimensions are
//! derived once whenever a raw dimension or scale factor changes, never
//! recomputed ad hoc by consumers.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{AtlasError, Result};

/// Immutable configuration for the full train/predict pipeline.
///
/// Defaults match the Human Protein Atlas setup: 28 classes, 512x512 raw
/// images scaled down by a factor of 4, a single retained channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameter {
    /// Path prefix for channel image files; file names are
    /// `<basepath><identifier>_<channel>.png`
    pub basepath: String,
    /// Number of output classes
    pub num_classes: usize,
    /// Raw image height in pixels
    pub image_rows: usize,
    /// Raw image width in pixels
    pub image_cols: usize,
    /// Number of samples per batch
    pub batch_size: usize,
    /// Number of leading channels retained from the 4-channel stack
    pub n_channels: usize,
    /// Vertical downscale factor
    pub row_scale_factor: usize,
    /// Horizontal downscale factor
    pub col_scale_factor: usize,
    /// Whether the epoch permutation is shuffled
    pub shuffle: bool,
    /// Number of training epochs
    pub n_epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Worker threads used when assembling a batch (1 = sequential)
    pub n_workers: usize,
    /// Seed for the epoch-shuffle RNG
    pub seed: u64,
    /// Derived: image_rows / row_scale_factor, floored
    pub scaled_row_dim: usize,
    /// Derived: image_cols / col_scale_factor, floored
    pub scaled_col_dim: usize,
}

impl ModelParameter {
    /// Create parameters with Human-Protein-Atlas defaults for the given
    /// image base path.
    pub fn new(basepath: impl Into<String>) -> Self {
        let mut p = Self {
            basepath: basepath.into(),
            num_classes: 28,
            image_rows: 512,
            image_cols: 512,
            batch_size: 200,
            n_channels: 1,
            row_scale_factor: 4,
            col_scale_factor: 4,
            shuffle: false,
            n_epochs: 1,
            learning_rate: 1e-3,
            n_workers: 1,
            seed: 42,
            scaled_row_dim: 0,
            scaled_col_dim: 0,
        };
        p.recompute_scaled_dims();
        p
    }

    fn recompute_scaled_dims(&mut self) {
        // Floor division; a factor larger than the dimension yields zero
        // and is rejected by validate().
        self.scaled_row_dim = if self.row_scale_factor > 0 {
            self.image_rows / self.row_scale_factor
        } else {
            0
        };
        self.scaled_col_dim = if self.col_scale_factor > 0 {
            self.image_cols / self.col_scale_factor
        } else {
            0
        };
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_image_dims(mut self, rows: usize, cols: usize) -> Self {
        self.image_rows = rows;
        self.image_cols = cols;
        self.recompute_scaled_dims();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_n_channels(mut self, n_channels: usize) -> Self {
        self.n_channels = n_channels;
        self
    }

    pub fn with_scale_factors(mut self, row: usize, col: usize) -> Self {
        self.row_scale_factor = row;
        self.col_scale_factor = col;
        self.recompute_scaled_dims();
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_n_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate the configuration. Consumers call this before training
    /// starts; nothing downstream tolerates an invalid parameter set.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(AtlasError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AtlasError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.n_channels == 0 || self.n_channels > crate::N_RAW_CHANNELS {
            return Err(AtlasError::Config(format!(
                "n_channels must be in 1..={}, got {}",
                crate::N_RAW_CHANNELS,
                self.n_channels
            )));
        }
        if self.row_scale_factor == 0 || self.col_scale_factor == 0 {
            return Err(AtlasError::Config(
                "scale factors must be greater than 0".to_string(),
            ));
        }
        if self.scaled_row_dim == 0 || self.scaled_col_dim == 0 {
            return Err(AtlasError::Config(format!(
                "scale factors {}x{} produce non-positive scaled dimensions for {}x{} images",
                self.row_scale_factor, self.col_scale_factor, self.image_rows, self.image_cols
            )));
        }
        if self.n_workers == 0 {
            return Err(AtlasError::Config(
                "n_workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Save parameters to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AtlasError::Config(format!("failed to serialize parameters: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load parameters from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&json)
            .map_err(|e| AtlasError::Config(format!("failed to parse parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scaled_dims() {
        let p = ModelParameter::new("/data/train/");
        assert_eq!(p.scaled_row_dim, 128);
        assert_eq!(p.scaled_col_dim, 128);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_scaled_dims_floor() {
        let p = ModelParameter::new("/data/").with_scale_factors(3, 5);
        assert_eq!(p.scaled_row_dim, 170); // 512 / 3 floored
        assert_eq!(p.scaled_col_dim, 102); // 512 / 5 floored
    }

    #[test]
    fn test_zero_scale_factor_rejected() {
        let p = ModelParameter::new("/data/").with_scale_factors(0, 4);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_oversized_scale_factor_rejected() {
        // Factor bigger than the image collapses the scaled dimension to 0.
        let p = ModelParameter::new("/data/")
            .with_image_dims(8, 8)
            .with_scale_factors(16, 16);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_n_channels_bounds() {
        assert!(ModelParameter::new("/d/").with_n_channels(4).validate().is_ok());
        assert!(ModelParameter::new("/d/").with_n_channels(5).validate().is_err());
        assert!(ModelParameter::new("/d/").with_n_channels(0).validate().is_err());
    }

    #[test]
    fn test_dims_recomputed_on_change() {
        let p = ModelParameter::new("/d/").with_image_dims(256, 256);
        assert_eq!(p.scaled_row_dim, 64);
        let p = p.with_scale_factors(2, 2);
        assert_eq!(p.scaled_row_dim, 128);
    }
}
