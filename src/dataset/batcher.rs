//! Batch assembly for the burn data pipeline.
//!
//! Preprocessed images arrive in rows-cols-channels order; burn's conv
//! layers want channels-first. The transpose happens here, once, at the
//! tensor boundary.

use std::marker::PhantomData;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use super::preprocess::ImageTensor;

/// One training or validation example: a preprocessed image and its
/// multi-hot label vector.
#[derive(Debug, Clone)]
pub struct AtlasItem {
    pub id: String,
    pub image: ImageTensor,
    pub targets: Vec<f32>,
}

/// A batch ready for the model: images as `[batch, channels, rows, cols]`
/// and targets as `[batch, num_classes]`.
#[derive(Debug, Clone)]
pub struct AtlasBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 2>,
}

#[derive(Debug, Clone, Default)]
pub struct AtlasBatcher<B: Backend> {
    _backend: PhantomData<B>,
}

impl<B: Backend> AtlasBatcher<B> {
    pub fn new() -> Self {
        Self {
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, AtlasItem, AtlasBatch<B>> for AtlasBatcher<B> {
    fn batch(&self, items: Vec<AtlasItem>, device: &B::Device) -> AtlasBatch<B> {
        let batch_size = items.len();
        let (rows, cols, channels) = items
            .first()
            .map(|item| item.image.shape())
            .unwrap_or((0, 0, 0));
        let num_classes = items.first().map(|item| item.targets.len()).unwrap_or(0);

        // HWC -> CHW per item, then one flat buffer for the whole batch.
        let mut image_data = Vec::with_capacity(batch_size * channels * rows * cols);
        let mut target_data = Vec::with_capacity(batch_size * num_classes);
        for item in &items {
            for ch in 0..channels {
                for r in 0..rows {
                    for c in 0..cols {
                        image_data.push(item.image.get(r, c, ch));
                    }
                }
            }
            target_data.extend_from_slice(&item.targets);
        }

        let images = Tensor::<B, 1>::from_floats(image_data.as_slice(), device)
            .reshape([batch_size, channels, rows, cols]);
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(target_data, [batch_size, num_classes]),
            device,
        );

        AtlasBatch { images, targets }
    }
}
