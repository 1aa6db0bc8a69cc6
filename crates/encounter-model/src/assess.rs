//! Threshold selection and accuracy metrics on held-out data.

use tracing::{info, instrument};

use crate::error::ModelError;

/// Which prediction stream an assessment describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Raw ensemble probabilities.
    Raw,
    /// Calibrated encounter rates.
    Calibrated,
}

/// Accuracy metrics for one prediction stream.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelAssessment {
    /// Threshold maximizing Kappa (presence iff `p >= threshold`).
    pub threshold: f64,
    /// Mean squared error of the probabilities against 0/1 labels.
    pub mse: f64,
    /// True positive rate at `threshold`.
    pub sensitivity: f64,
    /// True negative rate at `threshold`.
    pub specificity: f64,
    /// Area under the ROC curve.
    pub auc: f64,
    /// Cohen's Kappa at `threshold`.
    pub kappa: f64,
    /// Number of assessed rows.
    pub n: usize,
    /// Number of detections among the assessed rows.
    pub n_detected: usize,
}

/// Assessments of the raw and calibrated prediction streams.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AssessmentReport {
    /// Metrics for raw ensemble probabilities.
    pub raw: ModelAssessment,
    /// Metrics for calibrated encounter rates.
    pub calibrated: ModelAssessment,
}

impl AssessmentReport {
    /// Return the assessment for one variant.
    #[must_use]
    pub fn variant(&self, variant: ModelVariant) -> &ModelAssessment {
        match variant {
            ModelVariant::Raw => &self.raw,
            ModelVariant::Calibrated => &self.calibrated,
        }
    }
}

/// Confusion counts at one threshold.
#[derive(Debug, Clone, Copy)]
struct Confusion {
    tp: usize,
    fp: usize,
    fn_: usize,
    tn: usize,
}

impl Confusion {
    fn at(predictions: &[f64], labels: &[bool], threshold: f64) -> Self {
        let mut c = Confusion {
            tp: 0,
            fp: 0,
            fn_: 0,
            tn: 0,
        };
        for (&p, &y) in predictions.iter().zip(labels) {
            match (p >= threshold, y) {
                (true, true) => c.tp += 1,
                (true, false) => c.fp += 1,
                (false, true) => c.fn_ += 1,
                (false, false) => c.tn += 1,
            }
        }
        c
    }

    fn kappa(&self) -> f64 {
        let n = (self.tp + self.fp + self.fn_ + self.tn) as f64;
        let observed = (self.tp + self.tn) as f64 / n;
        let pred_pos = (self.tp + self.fp) as f64;
        let pred_neg = (self.fn_ + self.tn) as f64;
        let obs_pos = (self.tp + self.fn_) as f64;
        let obs_neg = (self.fp + self.tn) as f64;
        let expected = (pred_pos * obs_pos + pred_neg * obs_neg) / (n * n);
        (observed - expected) / (1.0 - expected)
    }
}

/// Selects the Kappa-maximizing threshold and computes accuracy metrics.
///
/// # Defaults
///
/// | Parameter      | Default                               |
/// |----------------|---------------------------------------|
/// | `n_thresholds` | 101 (0.00, 0.01, ..., 1.00)           |
#[derive(Debug, Clone)]
pub struct Assessor {
    n_thresholds: usize,
}

impl Assessor {
    /// Create an assessor with the default threshold grid.
    #[must_use]
    pub fn new() -> Self {
        Self { n_thresholds: 101 }
    }

    /// Set the number of equally spaced candidate thresholds on [0, 1].
    #[must_use]
    pub fn with_n_thresholds(mut self, n_thresholds: usize) -> Self {
        self.n_thresholds = n_thresholds;
        self
    }

    /// Return the candidate thresholds in increasing order.
    #[must_use]
    pub fn thresholds(&self) -> Vec<f64> {
        let last = self.n_thresholds.saturating_sub(1).max(1) as f64;
        (0..self.n_thresholds).map(|i| i as f64 / last).collect()
    }

    /// Assess one prediction stream against held-out labels.
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                                   |
    /// |-----------------------------------------|----------------------------------------|
    /// | [`ModelError::InvalidThresholdCount`]   | fewer than 2 thresholds                |
    /// | [`ModelError::EmptyInput`]              | no rows                                |
    /// | [`ModelError::LengthMismatch`]          | lengths differ                         |
    /// | [`ModelError::NonFinitePrediction`]     | a prediction is NaN or infinite        |
    /// | [`ModelError::SingleClassLabels`]       | labels contain only one class          |
    pub fn assess(&self, predictions: &[f64], labels: &[bool]) -> Result<ModelAssessment, ModelError> {
        if self.n_thresholds < 2 {
            return Err(ModelError::InvalidThresholdCount {
                n_thresholds: self.n_thresholds,
            });
        }
        if labels.is_empty() {
            return Err(ModelError::EmptyInput { stage: "assessment" });
        }
        if predictions.len() != labels.len() {
            return Err(ModelError::LengthMismatch {
                n_predictions: predictions.len(),
                n_labels: labels.len(),
            });
        }
        if let Some(index) = predictions.iter().position(|p| !p.is_finite()) {
            return Err(ModelError::NonFinitePrediction { index });
        }
        let n = labels.len();
        let n_detected = labels.iter().filter(|&&y| y).count();
        if n_detected == 0 || n_detected == n {
            return Err(ModelError::SingleClassLabels {
                n,
                detected: n_detected == n,
            });
        }

        let mut best: Option<(f64, Confusion, f64)> = None;
        for t in self.thresholds() {
            let confusion = Confusion::at(predictions, labels, t);
            let kappa = confusion.kappa();
            // Strict comparison keeps the lowest threshold on ties.
            if best.as_ref().is_none_or(|(_, _, k)| kappa > *k) {
                best = Some((t, confusion, kappa));
            }
        }
        let Some((threshold, confusion, kappa)) = best else {
            return Err(ModelError::InvalidThresholdCount {
                n_thresholds: self.n_thresholds,
            });
        };

        let mse = predictions
            .iter()
            .zip(labels)
            .map(|(&p, &y)| (p - if y { 1.0 } else { 0.0 }).powi(2))
            .sum::<f64>()
            / n as f64;

        Ok(ModelAssessment {
            threshold,
            mse,
            sensitivity: confusion.tp as f64 / (confusion.tp + confusion.fn_) as f64,
            specificity: confusion.tn as f64 / (confusion.tn + confusion.fp) as f64,
            auc: auc(predictions, labels),
            kappa,
            n,
            n_detected,
        })
    }

    /// Assess the raw and calibrated streams of the same rows.
    ///
    /// # Errors
    ///
    /// Same as [`Assessor::assess`].
    #[instrument(skip_all, fields(n = labels.len()))]
    pub fn assess_variants(
        &self,
        raw: &[f64],
        calibrated: &[f64],
        labels: &[bool],
    ) -> Result<AssessmentReport, ModelError> {
        let report = AssessmentReport {
            raw: self.assess(raw, labels)?,
            calibrated: self.assess(calibrated, labels)?,
        };
        for (variant, a) in [
            (ModelVariant::Raw, &report.raw),
            (ModelVariant::Calibrated, &report.calibrated),
        ] {
            info!(
                ?variant,
                threshold = a.threshold,
                mse = a.mse,
                auc = a.auc,
                kappa = a.kappa,
                sensitivity = a.sensitivity,
                specificity = a.specificity,
                "assessment"
            );
        }
        Ok(report)
    }
}

impl Default for Assessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Mann-Whitney AUC with average ranks for ties.
fn auc(predictions: &[f64], labels: &[bool]) -> f64 {
    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| predictions[a].total_cmp(&predictions[b]));

    let mut ranks = vec![0.0f64; predictions.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && predictions[order[j + 1]] == predictions[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean.
        let rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let n_pos = labels.iter().filter(|&&y| y).count() as f64;
    let n_neg = labels.len() as f64 - n_pos;
    let rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, y)| **y)
        .map(|(r, _)| r)
        .sum();
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_point_scenario_selects_perfect_threshold() {
        let a = Assessor::new()
            .assess(&[0.1, 0.4, 0.6, 0.9], &[false, false, true, true])
            .unwrap();
        assert!(a.threshold > 0.4 && a.threshold <= 0.6, "threshold {}", a.threshold);
        assert!((a.threshold - 0.41).abs() < 1e-12);
        assert!((a.kappa - 1.0).abs() < 1e-12);
        assert_eq!(a.sensitivity, 1.0);
        assert_eq!(a.specificity, 1.0);
        assert_eq!(a.auc, 1.0);
        assert!((a.mse - (0.01 + 0.16 + 0.16 + 0.01) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn selected_kappa_is_grid_maximum() {
        let preds = [0.05, 0.2, 0.35, 0.5, 0.52, 0.7, 0.8, 0.3, 0.65, 0.9];
        let labels = [false, false, true, false, true, true, false, false, true, true];
        let assessor = Assessor::new();
        let a = assessor.assess(&preds, &labels).unwrap();
        for t in assessor.thresholds() {
            let k = Confusion::at(&preds, &labels, t).kappa();
            assert!(k <= a.kappa);
            if k == a.kappa {
                assert!(t >= a.threshold);
            }
        }
    }

    #[test]
    fn auc_counts_ties_as_half() {
        assert_eq!(auc(&[0.5, 0.5], &[false, true]), 0.5);
        assert_eq!(auc(&[0.9, 0.1], &[false, true]), 0.0);
        assert!((auc(&[0.2, 0.5, 0.5, 0.8], &[false, false, true, true]) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn single_class_labels_rejected() {
        let err = Assessor::new().assess(&[0.2, 0.3], &[true, true]).unwrap_err();
        assert!(matches!(err, ModelError::SingleClassLabels { n: 2, detected: true }));
        assert_eq!(err.kind(), crate::ErrorKind::DataQuality);
    }

    #[test]
    fn invalid_inputs() {
        assert!(matches!(
            Assessor::new().with_n_thresholds(1).assess(&[0.1, 0.9], &[false, true]),
            Err(ModelError::InvalidThresholdCount { n_thresholds: 1 })
        ));
        assert!(matches!(
            Assessor::new().assess(&[0.1], &[false, true]),
            Err(ModelError::LengthMismatch { .. })
        ));
        assert!(matches!(
            Assessor::new().assess(&[0.1, f64::NAN], &[false, true]),
            Err(ModelError::NonFinitePrediction { index: 1 })
        ));
    }

    #[test]
    fn report_indexes_by_variant() {
        let report = Assessor::new()
            .assess_variants(&[0.1, 0.9], &[0.2, 0.8], &[false, true])
            .unwrap();
        assert_eq!(report.variant(ModelVariant::Raw), &report.raw);
        assert_eq!(report.variant(ModelVariant::Calibrated).mse, report.calibrated.mse);
    }
}
