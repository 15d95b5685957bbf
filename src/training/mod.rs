//! Training: focal loss and the epoch-driven trainer.

pub mod loss;
pub mod trainer;

pub use loss::FocalLoss;
pub use trainer::{EpochReport, Trainer, TrainingReport, FOCAL_GAMMA, PREDICTION_THRESHOLD};
