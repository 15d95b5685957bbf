//! ResNet-50 convolutional backbone.
//!
//! Bottleneck residual blocks in four stages of [3, 4, 6, 3] blocks. The
//! backbone yields the final `[batch, 2048, h, w]` feature map; pooling
//! and classification live in the head.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Convolution followed by batch normalization. Bias stays off since the
/// normalization shift absorbs it.
#[derive(Module, Debug)]
pub struct ConvNorm<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B>,
}

impl<B: Backend> ConvNorm<B> {
    fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);
        let norm = BatchNormConfig::new(out_channels).init(device);
        Self { conv, norm }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(x))
    }
}

/// One bottleneck residual block: 1x1 reduce, 3x3, 1x1 expand, with a
/// projection shortcut when the shape changes.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    reduce: ConvNorm<B>,
    spatial: ConvNorm<B>,
    expand: ConvNorm<B>,
    shortcut: Option<ConvNorm<B>>,
}

impl<B: Backend> Bottleneck<B> {
    fn new(
        device: &B::Device,
        in_channels: usize,
        mid_channels: usize,
        stride: usize,
    ) -> Self {
        let out_channels = mid_channels * 4;
        let shortcut = if stride != 1 || in_channels != out_channels {
            Some(ConvNorm::new(
                device,
                in_channels,
                out_channels,
                1,
                stride,
                0,
            ))
        } else {
            None
        };
        Self {
            reduce: ConvNorm::new(device, in_channels, mid_channels, 1, 1, 0),
            spatial: ConvNorm::new(device, mid_channels, mid_channels, 3, stride, 1),
            expand: ConvNorm::new(device, mid_channels, out_channels, 1, 1, 0),
            shortcut,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(projection) => projection.forward(x.clone()),
            None => x.clone(),
        };
        let out = relu(self.reduce.forward(x));
        let out = relu(self.spatial.forward(out));
        let out = self.expand.forward(out);
        relu(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet50Backbone<B: Backend> {
    stem: ConvNorm<B>,
    pool: MaxPool2d,
    layer1: Vec<Bottleneck<B>>,
    layer2: Vec<Bottleneck<B>>,
    layer3: Vec<Bottleneck<B>>,
    layer4: Vec<Bottleneck<B>>,
}

impl<B: Backend> ResNet50Backbone<B> {
    pub fn new(device: &B::Device, in_channels: usize) -> Self {
        Self {
            stem: ConvNorm::new(device, in_channels, 64, 7, 2, 3),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1: Self::stage(device, 64, 64, 3, 1),
            layer2: Self::stage(device, 256, 128, 4, 2),
            layer3: Self::stage(device, 512, 256, 6, 2),
            layer4: Self::stage(device, 1024, 512, 3, 2),
        }
    }

    fn stage(
        device: &B::Device,
        in_channels: usize,
        mid_channels: usize,
        blocks: usize,
        stride: usize,
    ) -> Vec<Bottleneck<B>> {
        let mut stage = Vec::with_capacity(blocks);
        stage.push(Bottleneck::new(device, in_channels, mid_channels, stride));
        for _ in 1..blocks {
            stage.push(Bottleneck::new(device, mid_channels * 4, mid_channels, 1));
        }
        stage
    }

    /// Feature map over `[batch, in_channels, rows, cols]` input, shape
    /// `[batch, 2048, rows', cols']` per `output_spatial`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = self.pool.forward(relu(self.stem.forward(x)));
        for block in &self.layer1 {
            out = block.forward(out);
        }
        for block in &self.layer2 {
            out = block.forward(out);
        }
        for block in &self.layer3 {
            out = block.forward(out);
        }
        for block in &self.layer4 {
            out = block.forward(out);
        }
        out
    }
}

/// Channel count of the backbone's final feature map.
pub const BACKBONE_CHANNELS: usize = 2048;

/// Spatial extent after the five stride-2 reductions (stem, max pool and
/// stages 2 to 4). Each halving maps n to floor((n - 1) / 2) + 1.
pub fn output_spatial(rows: usize, cols: usize) -> (usize, usize) {
    let halve = |mut n: usize| {
        for _ in 0..5 {
            n = (n.saturating_sub(1)) / 2 + 1;
        }
        n
    };
    (halve(rows), halve(cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    #[test]
    fn test_output_spatial_halves_five_times() {
        assert_eq!(output_spatial(128, 128), (4, 4));
        assert_eq!(output_spatial(224, 224), (7, 7));
        assert_eq!(output_spatial(8, 16), (1, 1));
    }

    #[test]
    fn test_stage_widths() {
        let device = Default::default();
        let backbone = ResNet50Backbone::<DefaultBackend>::new(&device, 1);
        assert_eq!(backbone.layer1.len(), 3);
        assert_eq!(backbone.layer2.len(), 4);
        assert_eq!(backbone.layer3.len(), 6);
        assert_eq!(backbone.layer4.len(), 3);
    }

    #[test]
    fn test_forward_shape_matches_arithmetic() {
        let device = Default::default();
        let backbone = ResNet50Backbone::<DefaultBackend>::new(&device, 1);
        let input = Tensor::<DefaultBackend, 4>::zeros([1, 1, 8, 8], &device);
        let out = backbone.forward(input);
        let (h, w) = output_spatial(8, 8);
        assert_eq!(out.dims(), [1, BACKBONE_CHANNELS, h, w]);
    }
}
