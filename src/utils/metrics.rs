//! Multi-label Evaluation Metrics
//!
//! Computes per-class and aggregate metrics from probability predictions
//! against multi-hot targets. A prediction counts as positive when its
//! probability reaches the decision threshold (default 0.5).

/// Aggregate metrics for a multi-label evaluation pass
#[derive(Debug, Clone)]
pub struct MultiLabelMetrics {
    /// Macro-averaged precision over classes
    pub macro_precision: f64,
    /// Macro-averaged recall over classes
    pub macro_recall: f64,
    /// Macro-averaged F1 over classes
    pub macro_f1: f64,
    /// Fraction of samples whose full label vector was predicted exactly
    pub exact_match: f64,
    /// Average evaluation loss, when available
    pub loss: Option<f64>,
    /// Number of samples evaluated
    pub num_samples: usize,
}

impl MultiLabelMetrics {
    /// Compute metrics from probability rows and multi-hot target rows.
    ///
    /// Both slices must have the same length and row width.
    pub fn from_probabilities(
        probabilities: &[Vec<f32>],
        targets: &[Vec<f32>],
        threshold: f32,
    ) -> Self {
        assert_eq!(probabilities.len(), targets.len());

        let num_samples = probabilities.len();
        if num_samples == 0 {
            return Self {
                macro_precision: 0.0,
                macro_recall: 0.0,
                macro_f1: 0.0,
                exact_match: 0.0,
                loss: None,
                num_samples: 0,
            };
        }

        let num_classes = probabilities[0].len();
        let mut tp = vec![0usize; num_classes];
        let mut fp = vec![0usize; num_classes];
        let mut fn_ = vec![0usize; num_classes];
        let mut exact = 0usize;

        for (probs, target) in probabilities.iter().zip(targets.iter()) {
            let mut all_match = true;
            for c in 0..num_classes {
                let predicted = probs[c] >= threshold;
                let actual = target[c] >= 0.5;
                match (predicted, actual) {
                    (true, true) => tp[c] += 1,
                    (true, false) => {
                        fp[c] += 1;
                        all_match = false;
                    }
                    (false, true) => {
                        fn_[c] += 1;
                        all_match = false;
                    }
                    (false, false) => {}
                }
            }
            if all_match {
                exact += 1;
            }
        }

        let mut precision_sum = 0.0;
        let mut recall_sum = 0.0;
        let mut f1_sum = 0.0;

        for c in 0..num_classes {
            let p = if tp[c] + fp[c] > 0 {
                tp[c] as f64 / (tp[c] + fp[c]) as f64
            } else {
                0.0
            };
            let r = if tp[c] + fn_[c] > 0 {
                tp[c] as f64 / (tp[c] + fn_[c]) as f64
            } else {
                0.0
            };
            let f1 = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

            precision_sum += p;
            recall_sum += r;
            f1_sum += f1;
        }

        Self {
            macro_precision: precision_sum / num_classes as f64,
            macro_recall: recall_sum / num_classes as f64,
            macro_f1: f1_sum / num_classes as f64,
            exact_match: exact as f64 / num_samples as f64,
            loss: None,
            num_samples,
        }
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        format!(
            "precision={:.4} recall={:.4} f1={:.4} exact_match={:.4} ({} samples)",
            self.macro_precision, self.macro_recall, self.macro_f1, self.exact_match,
            self.num_samples
        )
    }
}
