//! The persisted model: ensemble, calibration, and reference effort.

use std::path::Path;

use encounter_forest::TrainedEnsemble;
use encounter_survey::ObservationSet;
use tracing::{debug, info, instrument};

use crate::assess::{AssessmentReport, Assessor};
use crate::calibration::CalibrationMap;
use crate::error::ModelError;
use crate::surface::ReferenceEffort;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized model.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Number of trees in the ensemble.
    n_trees: usize,
    /// Covariate names the ensemble was trained on.
    covariate_names: Vec<String>,
    /// The serialized model.
    model: TrainedModel,
}

/// A fitted ensemble with its calibration and the reference effort chosen
/// during fitting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrainedModel {
    ensemble: TrainedEnsemble,
    calibration: CalibrationMap,
    reference_effort: ReferenceEffort,
}

impl TrainedModel {
    /// Bundle the fitted parts.
    #[must_use]
    pub fn new(
        ensemble: TrainedEnsemble,
        calibration: CalibrationMap,
        reference_effort: ReferenceEffort,
    ) -> Self {
        Self {
            ensemble,
            calibration,
            reference_effort,
        }
    }

    /// Return the ensemble.
    #[must_use]
    pub fn ensemble(&self) -> &TrainedEnsemble {
        &self.ensemble
    }

    /// Return the calibration map.
    #[must_use]
    pub fn calibration(&self) -> &CalibrationMap {
        &self.calibration
    }

    /// Return the reference effort stored with the model.
    #[must_use]
    pub fn reference_effort(&self) -> &ReferenceEffort {
        &self.reference_effort
    }

    /// Return the covariate names in model order.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        self.ensemble.covariate_names()
    }

    /// Raw ensemble probabilities for complete rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Forest`] if a row has the wrong width.
    pub fn predict_raw(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        Ok(self.ensemble.predict_batch(rows)?)
    }

    /// Calibrated encounter rates for complete rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Forest`] if a row has the wrong width.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        Ok(self.calibration.apply_batch(&self.predict_raw(rows)?))
    }

    /// Assess raw and calibrated predictions on a labelled set whose schema
    /// matches the model.
    ///
    /// # Errors
    ///
    /// | Variant                        | When                                         |
    /// |--------------------------------|----------------------------------------------|
    /// | [`ModelError::Forest`]         | schema names or order differ from the model  |
    /// | [`ModelError::Survey`]         | a covariate is missing                       |
    /// | others                         | see [`Assessor::assess`]                     |
    pub fn assess(&self, set: &ObservationSet, assessor: &Assessor) -> Result<AssessmentReport, ModelError> {
        self.ensemble.check_covariates(set.schema().names())?;
        let rows = set.feature_matrix()?;
        let labels = set.labels();
        let raw = self.predict_raw(&rows)?;
        let calibrated = self.calibration.apply_batch(&raw);
        assessor.assess_variants(&raw, &calibrated, &labels)
    }

    /// Save the model to a binary file in a versioned envelope.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::SerializeModel`] | bincode encoding failed |
    /// | [`ModelError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            n_trees: self.ensemble.n_trees(),
            covariate_names: self.covariate_names().to_vec(),
            model: self.clone(),
        };

        let bytes = bincode::serialize(&envelope).map_err(|e| ModelError::SerializeModel { source: e })?;
        std::fs::write(path, &bytes).map_err(|e| ModelError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_trees = self.ensemble.n_trees(),
            "model saved"
        );
        Ok(())
    }

    /// Load a model saved by [`TrainedModel::save`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::ReadModel`] | file read failed |
    /// | [`ModelError::DeserializeModel`] | bincode decoding failed |
    /// | [`ModelError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ModelError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|e| ModelError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(ModelError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            n_trees = envelope.n_trees,
            n_covariates = envelope.covariate_names.len(),
            "model loaded"
        );
        Ok(envelope.model)
    }
}
