//! Backend selection.
//!
//! CPU ndarray by default; the `wgpu` feature switches to the GPU
//! compute backend without touching any call sites.

use burn::prelude::Backend;

#[cfg(feature = "wgpu")]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(not(feature = "wgpu"))]
pub type DefaultBackend = burn::backend::NdArray<f32>;

/// Autodiff wrapper used for training.
pub type TrainingBackend = burn::backend::Autodiff<DefaultBackend>;

pub fn default_device() -> <DefaultBackend as Backend>::Device {
    Default::default()
}

pub fn backend_name() -> &'static str {
    if cfg!(feature = "wgpu") {
        "wgpu"
    } else {
        "ndarray"
    }
}
