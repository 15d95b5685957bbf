//! Focal loss over logits for multi-label targets.
//!
//! Numerically stable binary cross entropy with logits, scaled per
//! element by (1 - p_t)^gamma so well-classified examples contribute
//! little. Elements are summed per sample and averaged over the batch.

use burn::prelude::*;
use burn::tensor::activation::{log_sigmoid, relu};

#[derive(Debug, Clone, Copy)]
pub struct FocalLoss {
    gamma: f64,
}

impl FocalLoss {
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }

    /// Scalar loss for `[batch, num_classes]` logits and multi-hot
    /// targets of the same shape.
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        // Stable form of BCE with logits:
        //   x - x*t + relu(-x) + ln(exp(-relu(-x)) + exp(-x - relu(-x)))
        let neg_part = relu(logits.clone().neg());
        let log_term = (neg_part.clone().neg().exp()
            + (logits.clone().neg() - neg_part.clone()).exp())
        .log();
        let bce = logits.clone() - logits.clone() * targets.clone() + neg_part + log_term;

        // (1 - p_t)^gamma via log-sigmoid, staying in log space until
        // the final exp.
        let signs = targets.mul_scalar(2.0).sub_scalar(1.0);
        let modulator = log_sigmoid(logits.neg() * signs)
            .mul_scalar(self.gamma)
            .exp();

        (modulator * bce).sum_dim(1).mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    fn scalar_loss(gamma: f64, logit: f32, target: f32) -> f32 {
        let device = Default::default();
        let logits = Tensor::<DefaultBackend, 2>::from_data(
            TensorData::new(vec![logit], [1, 1]),
            &device,
        );
        let targets = Tensor::<DefaultBackend, 2>::from_data(
            TensorData::new(vec![target], [1, 1]),
            &device,
        );
        FocalLoss::new(gamma)
            .forward(logits, targets)
            .into_data()
            .as_slice::<f32>()
            .unwrap()[0]
    }

    #[test]
    fn test_gamma_zero_is_plain_bce() {
        let ln2 = std::f32::consts::LN_2;
        assert!((scalar_loss(0.0, 0.0, 1.0) - ln2).abs() < 1e-5);
        assert!((scalar_loss(0.0, 0.0, 0.0) - ln2).abs() < 1e-5);
    }

    #[test]
    fn test_gamma_two_downweights_uncertain_example() {
        let expected = 0.25 * std::f32::consts::LN_2;
        assert!((scalar_loss(2.0, 0.0, 1.0) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_confident_correct_prediction_nearly_free() {
        assert!(scalar_loss(2.0, 8.0, 1.0) < 1e-4);
        assert!(scalar_loss(2.0, -8.0, 0.0) < 1e-4);
    }

    #[test]
    fn test_confident_wrong_prediction_stays_costly() {
        assert!(scalar_loss(2.0, -8.0, 1.0) > 4.0);
    }

    #[test]
    fn test_sums_over_classes_then_averages_batch() {
        let device = Default::default();
        let logits = Tensor::<DefaultBackend, 2>::from_data(
            TensorData::new(vec![0.0; 4], [2, 2]),
            &device,
        );
        let targets = Tensor::<DefaultBackend, 2>::from_data(
            TensorData::new(vec![1.0, 0.0, 0.0, 1.0], [2, 2]),
            &device,
        );
        let loss = FocalLoss::new(0.0)
            .forward(logits, targets)
            .into_data()
            .as_slice::<f32>()
            .unwrap()[0];
        // Two classes each contributing ln 2, averaged over two samples.
        assert!((loss - 2.0 * std::f32::consts::LN_2).abs() < 1e-5);
    }
}
