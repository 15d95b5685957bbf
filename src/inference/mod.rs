//! Inference over unlabeled image sets.

pub mod predictor;

pub use predictor::{PredictGenerator, PredictionTable};
