//! Dataset pipeline: labels, image preprocessing, epoch batching and
//! tensor assembly.

pub mod batcher;
pub mod generator;
pub mod labels;
pub mod preprocess;

pub use batcher::{AtlasBatch, AtlasBatcher, AtlasItem};
pub use generator::DataGenerator;
pub use labels::{read_fold_ids, LabelRow, LabelTable};
pub use preprocess::{ImagePreprocessor, ImageTensor};
