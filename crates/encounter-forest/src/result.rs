//! Training result types.

use crate::forest::TrainedEnsemble;
use crate::oob::OobPredictions;

/// Metadata about the training run.
#[derive(Debug, Clone)]
pub struct TrainingMetadata {
    /// Number of trees trained.
    pub n_trees: usize,
    /// Number of covariates.
    pub n_covariates: usize,
    /// Number of training rows.
    pub n_samples: usize,
    /// Number of detections among the training rows.
    pub n_detected: usize,
    /// Resolved `mtry`.
    pub mtry: usize,
}

/// Result of ensemble training: the fitted ensemble, optional OOB
/// predictions, and run metadata.
#[derive(Debug)]
pub struct ForestFit {
    ensemble: TrainedEnsemble,
    oob: Option<OobPredictions>,
    metadata: TrainingMetadata,
}

impl ForestFit {
    pub(crate) fn new(
        ensemble: TrainedEnsemble,
        oob: Option<OobPredictions>,
        metadata: TrainingMetadata,
    ) -> Self {
        Self {
            ensemble,
            oob,
            metadata,
        }
    }

    /// Borrow the fitted ensemble.
    #[must_use]
    pub fn ensemble(&self) -> &TrainedEnsemble {
        &self.ensemble
    }

    /// Consume the result and return the fitted ensemble.
    #[must_use]
    pub fn into_ensemble(self) -> TrainedEnsemble {
        self.ensemble
    }

    /// Return the OOB predictions, if computed.
    #[must_use]
    pub fn oob_predictions(&self) -> Option<&OobPredictions> {
        self.oob.as_ref()
    }

    /// Return training metadata.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }
}
