//! Training loop: focal loss over epoch-ordered batches with Adam, and
//! validation on the non-autodiff side of the backend.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::config::ModelParameter;
use crate::dataset::{AtlasBatcher, DataGenerator};
use crate::model::{AtlasClassifier, AtlasClassifierConfig};
use crate::utils::error::{AtlasError, Result};
use crate::utils::metrics::MultiLabelMetrics;

use super::loss::FocalLoss;

/// Focal loss focusing exponent, fixed across runs.
pub const FOCAL_GAMMA: f64 = 2.0;

/// Decision threshold for validation metrics.
pub const PREDICTION_THRESHOLD: f32 = 0.5;

/// Per-epoch record of what training did.
#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_loss: f64,
    pub valid_metrics: MultiLabelMetrics,
}

/// Full fit outcome, one entry per epoch.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub epochs: Vec<EpochReport>,
}

pub struct Trainer<B: AutodiffBackend> {
    model: AtlasClassifier<B>,
    optimizer: OptimizerAdaptor<Adam, AtlasClassifier<B>, B>,
    loss: FocalLoss,
    params: ModelParameter,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(params: ModelParameter, device: B::Device) -> Result<Self> {
        params.validate()?;
        let model = AtlasClassifierConfig::from_params(&params).init(&device);
        let optimizer = AdamConfig::new().init();
        Ok(Self {
            model,
            optimizer,
            loss: FocalLoss::new(FOCAL_GAMMA),
            params,
            device,
        })
    }

    pub fn model(&self) -> &AtlasClassifier<B> {
        &self.model
    }

    /// Run the configured number of epochs. Each epoch walks every full
    /// batch of the training generator, then scores the validation
    /// generator, then refreshes both permutations.
    pub fn fit(
        &mut self,
        train: &mut DataGenerator,
        valid: &mut DataGenerator,
    ) -> Result<TrainingReport> {
        let mut report = TrainingReport::default();
        let batcher = AtlasBatcher::<B>::new();

        for epoch in 1..=self.params.n_epochs {
            let batch_count = train.batch_count();
            let mut epoch_loss = 0.0;

            for index in 0..batch_count {
                let items = train.batch(index)?;
                let batch = batcher.batch(items, &self.device);

                let logits = self.model.forward(batch.images);
                let loss = self.loss.forward(logits, batch.targets);
                let loss_value = loss
                    .clone()
                    .into_data()
                    .as_slice::<f32>()
                    .map_err(|e| AtlasError::Model(format!("loss readback: {:?}", e)))?[0]
                    as f64;
                epoch_loss += loss_value;

                let grads = GradientsParams::from_grads(loss.backward(), &self.model);
                self.model = self.optimizer.step(
                    self.params.learning_rate,
                    self.model.clone(),
                    grads,
                );

                if index % 10 == 0 {
                    info!(
                        epoch,
                        batch = index + 1,
                        total = batch_count,
                        loss = loss_value,
                        "training step"
                    );
                }
            }

            let train_loss = epoch_loss / batch_count.max(1) as f64;
            let valid_metrics = self.evaluate(valid)?;
            info!(
                epoch,
                train_loss,
                valid_f1 = valid_metrics.macro_f1,
                valid_exact = valid_metrics.exact_match,
                "epoch complete"
            );

            report.epochs.push(EpochReport {
                epoch,
                train_loss,
                valid_metrics,
            });

            train.on_epoch_end();
            valid.on_epoch_end();
        }

        Ok(report)
    }

    /// Score a generator's full batches with the inference-side model.
    pub fn evaluate(&self, generator: &DataGenerator) -> Result<MultiLabelMetrics> {
        let model = self.model.valid();
        let batcher = AtlasBatcher::<B::InnerBackend>::new();
        let loss_fn = FocalLoss::new(FOCAL_GAMMA);

        let mut probabilities = Vec::new();
        let mut targets = Vec::new();
        let mut loss_sum = 0.0;
        let batch_count = generator.batch_count();

        for index in 0..batch_count {
            let items = generator.batch(index)?;
            for item in &items {
                targets.push(item.targets.clone());
            }
            let batch = batcher.batch(items, &self.device);

            let logits = model.forward(batch.images.clone());
            let loss = loss_fn.forward(logits.clone(), batch.targets);
            loss_sum += loss
                .into_data()
                .as_slice::<f32>()
                .map_err(|e| AtlasError::Model(format!("loss readback: {:?}", e)))?[0]
                as f64;

            let probs = burn::tensor::activation::sigmoid(logits);
            let [batch_size, num_classes] = probs.dims();
            let data = probs.into_data();
            let values = data
                .as_slice::<f32>()
                .map_err(|e| AtlasError::Model(format!("probability readback: {:?}", e)))?;
            for row in 0..batch_size {
                probabilities
                    .push(values[row * num_classes..(row + 1) * num_classes].to_vec());
            }
        }

        let mut metrics = MultiLabelMetrics::from_probabilities(
            &probabilities,
            &targets,
            PREDICTION_THRESHOLD,
        );
        if batch_count > 0 {
            metrics.loss = Some(loss_sum / batch_count as f64);
        }
        Ok(metrics)
    }

    /// Persist model weights with the compact binary recorder.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.model
            .clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| AtlasError::Model(format!("saving weights: {}", e)))?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    /// Replace the current weights with a saved record. The architecture
    /// must match the parameters this trainer was built with.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let model = AtlasClassifierConfig::from_params(&self.params)
            .init::<B>(&self.device)
            .load_file(path, &CompactRecorder::new(), &self.device)
            .map_err(|e| AtlasError::Model(format!("loading weights: {}", e)))?;
        self.model = model;
        info!(path = %path.display(), "model loaded");
        Ok(())
    }
}
