//! Model architecture: ResNet-50 backbone and the multi-label head.

pub mod classifier;
pub mod resnet;

pub use classifier::{AtlasClassifier, AtlasClassifierConfig};
pub use resnet::{ResNet50Backbone, BACKBONE_CHANNELS};
