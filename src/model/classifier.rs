//! Multi-label classification head on the ResNet-50 backbone.
//!
//! The feature map is flattened and run through a two-layer head with
//! dropout. The model emits logits; `forward_sigmoid` adds the per-class
//! sigmoid for independent multi-label probabilities.

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};

use crate::config::ModelParameter;

use super::resnet::{output_spatial, ResNet50Backbone, BACKBONE_CHANNELS};

#[derive(Config, Debug)]
pub struct AtlasClassifierConfig {
    pub num_classes: usize,
    pub image_rows: usize,
    pub image_cols: usize,
    pub in_channels: usize,
    #[config(default = 1024)]
    pub hidden_units: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl AtlasClassifierConfig {
    /// Configuration matching the preprocessed image geometry.
    pub fn from_params(params: &ModelParameter) -> Self {
        Self::new(
            params.num_classes,
            params.scaled_row_dim,
            params.scaled_col_dim,
            params.n_channels,
        )
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AtlasClassifier<B> {
        let (rows, cols) = output_spatial(self.image_rows, self.image_cols);
        let flat_dim = BACKBONE_CHANNELS * rows * cols;
        AtlasClassifier {
            backbone: ResNet50Backbone::new(device, self.in_channels),
            dropout: DropoutConfig::new(self.dropout).init(),
            hidden: LinearConfig::new(flat_dim, self.hidden_units).init(device),
            output: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct AtlasClassifier<B: Backend> {
    backbone: ResNet50Backbone<B>,
    dropout: Dropout,
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> AtlasClassifier<B> {
    /// Per-class logits for `[batch, channels, rows, cols]` images.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, ..] = images.dims();
        let features = self.backbone.forward(images);
        let flat = features.reshape([batch_size as i32, -1]);
        let flat = self.dropout.forward(relu(flat));
        let hidden = self.dropout.forward(relu(self.hidden.forward(flat)));
        self.output.forward(hidden)
    }

    /// Per-class probabilities in (0, 1), independent across classes.
    pub fn forward_sigmoid(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    fn tiny_config() -> AtlasClassifierConfig {
        AtlasClassifierConfig::new(4, 8, 8, 1).with_hidden_units(16)
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = tiny_config().init::<DefaultBackend>(&device);
        let images = Tensor::zeros([2, 1, 8, 8], &device);
        assert_eq!(model.forward(images).dims(), [2, 4]);
    }

    #[test]
    fn test_probabilities_bounded() {
        let device = Default::default();
        let model = tiny_config().init::<DefaultBackend>(&device);
        let images = Tensor::random(
            [1, 1, 8, 8],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let probs = model.forward_sigmoid(images).into_data();
        for &p in probs.as_slice::<f32>().unwrap() {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn test_config_follows_scaled_dims() {
        let params = ModelParameter::new("data/".to_string())
            .with_image_dims(512, 512)
            .with_scale_factors(4, 4)
            .with_n_channels(2);
        let config = AtlasClassifierConfig::from_params(&params);
        assert_eq!(config.image_rows, 128);
        assert_eq!(config.image_cols, 128);
        assert_eq!(config.in_channels, 2);
        assert_eq!(config.num_classes, 28);
    }
}
