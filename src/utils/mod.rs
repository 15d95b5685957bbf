//! Shared utilities: error types, logging setup and evaluation metrics.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{AtlasError, Result};
pub use metrics::MultiLabelMetrics;
