//! Image Assembly and Preprocessing
//!
//! Samples are stored on disk as four single-channel PNG files per
//! identifier (`<basepath><id>_<channel>.png`, channels green/blue/red/
//! yellow). `ImagePreprocessor::load_image` stacks them into one
//! height x width x channel tensor and trims it to the configured channel
//! count; `preprocess` then resizes, reshapes and normalizes the stack into
//! model input.

use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};

use crate::config::ModelParameter;
use crate::utils::error::{AtlasError, Result};
use crate::CHANNEL_SUFFIXES;

/// A dense row-major image tensor in HWC layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
    /// Pixel values, index `(r * cols + c) * channels + ch`
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Allocate a zero-filled tensor
    pub fn zeros(rows: usize, cols: usize, channels: usize) -> Self {
        Self {
            rows,
            cols,
            channels,
            data: vec![0.0; rows * cols * channels],
        }
    }

    /// Shape as (rows, cols, channels)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.channels)
    }

    /// Value at (row, col, channel)
    pub fn get(&self, r: usize, c: usize, ch: usize) -> f32 {
        self.data[(r * self.cols + c) * self.channels + ch]
    }

    /// Set value at (row, col, channel)
    pub fn set(&mut self, r: usize, c: usize, ch: usize, value: f32) {
        self.data[(r * self.cols + c) * self.channels + ch] = value;
    }

    /// Extract one channel as a contiguous plane of `rows * cols` values
    pub fn channel_plane(&self, ch: usize) -> Vec<f32> {
        let mut plane = Vec::with_capacity(self.rows * self.cols);
        for r in 0..self.rows {
            for c in 0..self.cols {
                plane.push(self.get(r, c, ch));
            }
        }
        plane
    }
}

/// Loads channel files and turns raw stacks into model input.
///
/// The base path is always an explicit argument to `load_image`, so the
/// same preprocessor serves training and prediction without any state
/// swapping.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    image_rows: usize,
    image_cols: usize,
    scaled_row_dim: usize,
    scaled_col_dim: usize,
    n_channels: usize,
}

impl ImagePreprocessor {
    pub fn new(params: &ModelParameter) -> Self {
        Self {
            image_rows: params.image_rows,
            image_cols: params.image_cols,
            scaled_row_dim: params.scaled_row_dim,
            scaled_col_dim: params.scaled_col_dim,
            n_channels: params.n_channels,
        }
    }

    /// Read the four channel files for `id` and stack them in the fixed
    /// order green, blue, red, yellow, keeping the first `n_channels`
    /// channels of the stack.
    ///
    /// All four files are read even when fewer channels are retained; a
    /// missing or undecodable file is an error and the whole sample is
    /// invalid. There is no retry.
    pub fn load_image(&self, basepath: &str, id: &str) -> Result<ImageTensor> {
        let mut planes = Vec::with_capacity(CHANNEL_SUFFIXES.len());
        for suffix in CHANNEL_SUFFIXES {
            let path = PathBuf::from(format!("{}{}_{}.png", basepath, id, suffix));
            let decoded = image::open(&path)
                .map_err(|e| AtlasError::ImageLoad(path.clone(), e.to_string()))?;
            let gray = decoded.to_luma8();
            if gray.width() as usize != self.image_cols || gray.height() as usize != self.image_rows
            {
                return Err(AtlasError::ImageLoad(
                    path,
                    format!(
                        "expected {}x{} pixels, got {}x{}",
                        self.image_cols,
                        self.image_rows,
                        gray.width(),
                        gray.height()
                    ),
                ));
            }
            planes.push(gray);
        }

        let mut stack = ImageTensor::zeros(self.image_rows, self.image_cols, self.n_channels);
        for ch in 0..self.n_channels {
            let plane = &planes[ch];
            for r in 0..self.image_rows {
                for c in 0..self.image_cols {
                    stack.set(r, c, ch, plane.get_pixel(c as u32, r as u32)[0] as f32);
                }
            }
        }
        Ok(stack)
    }

    /// Full preprocessing chain: resize, reshape, normalize, in that order.
    ///
    /// Must be called exactly once per loaded image; `normalize` is a plain
    /// division by 255 and calling the chain twice scales twice.
    pub fn preprocess(&self, image: ImageTensor) -> Result<ImageTensor> {
        let image = self.resize(image)?;
        let image = self.reshape(image)?;
        Ok(self.normalize(image))
    }

    /// Resize every channel plane to the configured scaled dimensions using
    /// bilinear (anti-aliased) interpolation. Channel count is preserved and
    /// any input size is accepted.
    pub fn resize(&self, image: ImageTensor) -> Result<ImageTensor> {
        if image.rows == self.scaled_row_dim && image.cols == self.scaled_col_dim {
            return Ok(image);
        }

        let mut out = ImageTensor::zeros(self.scaled_row_dim, self.scaled_col_dim, image.channels);
        for ch in 0..image.channels {
            // `imageops` clamps f32 samples to [0, 1]; resample in that
            // range and scale back to [0, 255] afterwards.
            let plane: Vec<f32> = image
                .channel_plane(ch)
                .into_iter()
                .map(|v| v / 255.0)
                .collect();
            let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
                ImageBuffer::from_raw(image.cols as u32, image.rows as u32, plane).ok_or_else(
                    || AtlasError::Dataset("channel plane does not match image shape".to_string()),
                )?;
            let resized = imageops::resize(
                &buffer,
                self.scaled_col_dim as u32,
                self.scaled_row_dim as u32,
                FilterType::Triangle,
            );
            for r in 0..self.scaled_row_dim {
                for c in 0..self.scaled_col_dim {
                    out.set(r, c, ch, resized.get_pixel(c as u32, r as u32)[0] * 255.0);
                }
            }
        }
        Ok(out)
    }

    /// Enforce the 3-D `(rows, cols, n_channels)` shape without touching
    /// values. Fails when the element count cannot form that shape.
    pub fn reshape(&self, mut image: ImageTensor) -> Result<ImageTensor> {
        let expected = image.rows * image.cols * self.n_channels;
        if image.data.len() != expected {
            return Err(AtlasError::Dataset(format!(
                "cannot reshape {} elements into {}x{}x{}",
                image.data.len(),
                image.rows,
                image.cols,
                self.n_channels
            )));
        }
        image.channels = self.n_channels;
        Ok(image)
    }

    /// Divide every pixel by 255 in place. Assumes input range [0, 255];
    /// deliberately not idempotent.
    pub fn normalize(&self, mut image: ImageTensor) -> ImageTensor {
        for v in image.data.iter_mut() {
            *v /= 255.0;
        }
        image
    }
}
