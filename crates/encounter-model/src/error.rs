//! Error types for encounter-model.

use std::path::PathBuf;

use encounter_forest::ForestError;
use encounter_survey::SurveyError;

/// Broad classification of a [`ModelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid parameters or a covariate schema mismatch.
    Configuration,
    /// The records cannot support the requested stage.
    DataQuality,
    /// A numerical procedure failed to produce a usable result.
    Numerical,
    /// Reading or writing a model artifact failed.
    Io,
}

/// Errors from calibration, assessment, dependence analysis, surface
/// prediction, artifact persistence, and pipeline orchestration.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Propagated from survey data handling.
    #[error(transparent)]
    Survey(#[from] SurveyError),

    /// Propagated from ensemble training or inference.
    #[error(transparent)]
    Forest(#[from] ForestError),

    /// Returned when the spline basis has fewer than 3 functions.
    #[error("calibration degrees of freedom must be at least 3, got {df}")]
    InvalidDegreesOfFreedom {
        /// The value supplied.
        df: usize,
    },

    /// Returned when a numeric calibration parameter is invalid.
    #[error("invalid calibration parameter {name} = {value}")]
    InvalidCalibrationParameter {
        /// Parameter name.
        name: &'static str,
        /// The value supplied.
        value: f64,
    },

    /// Returned when fewer than two thresholds are requested.
    #[error("threshold count must be at least 2, got {n_thresholds}")]
    InvalidThresholdCount {
        /// The value supplied.
        n_thresholds: usize,
    },

    /// Returned when the partial-dependence grid has fewer than 2 points.
    #[error("dependence grid size must be at least 2, got {grid_size}")]
    InvalidGridSize {
        /// The value supplied.
        grid_size: usize,
    },

    /// Returned when the minimum hour share is outside [0, 1).
    #[error("minimum hour share must be in [0, 1), got {share}")]
    InvalidHourShare {
        /// The value supplied.
        share: f64,
    },

    /// Returned when a named covariate is not in the model schema.
    #[error("covariate \"{name}\" is not in the model schema")]
    UnknownCovariate {
        /// The requested name.
        name: String,
    },

    /// Returned when reference effort and grid habitat names do not
    /// partition the model schema.
    #[error(
        "surface covariates do not match the model schema: missing {missing:?}, \
         supplied twice {duplicated:?}, unexpected {unexpected:?}"
    )]
    SurfaceSchemaMismatch {
        /// Model covariates supplied by neither source.
        missing: Vec<String>,
        /// Model covariates supplied by both sources.
        duplicated: Vec<String>,
        /// Supplied names the model does not use.
        unexpected: Vec<String>,
    },

    /// Returned when grid habitat columns name the right covariates in a
    /// different order than the model schema.
    #[error("grid habitat columns {got:?} are out of model order, expected {expected:?}")]
    HabitatOrderMismatch {
        /// Habitat covariates in model order.
        expected: Vec<String>,
        /// Habitat columns as supplied by the grid.
        got: Vec<String>,
    },

    /// Returned when a prediction grid point has the wrong number of habitat values.
    #[error("grid point {index} has {got} habitat values, expected {expected}")]
    GridWidthMismatch {
        /// Zero-based index of the point.
        index: usize,
        /// Number of habitat names.
        expected: usize,
        /// Number of values on the point.
        got: usize,
    },

    /// Returned when a prediction grid value is NaN or infinite.
    #[error("grid point \"{point_id}\" has a non-finite value for \"{covariate}\"")]
    NonFiniteGridValue {
        /// Identifier of the point.
        point_id: String,
        /// Covariate name.
        covariate: String,
    },

    /// Returned when a stage receives no rows.
    #[error("{stage} received no rows")]
    EmptyInput {
        /// Stage that received the empty input.
        stage: &'static str,
    },

    /// Returned when predictions and labels differ in length.
    #[error("{n_predictions} predictions supplied for {n_labels} labels")]
    LengthMismatch {
        /// Number of predictions.
        n_predictions: usize,
        /// Number of labels.
        n_labels: usize,
    },

    /// Returned when a predicted probability is NaN or infinite.
    #[error("prediction {index} is not finite")]
    NonFinitePrediction {
        /// Zero-based index of the prediction.
        index: usize,
    },

    /// Returned when assessment labels contain a single class.
    #[error("all {n} labels are {}, assessment needs both classes", class_label(.detected))]
    SingleClassLabels {
        /// Number of labels.
        n: usize,
        /// The only class present.
        detected: bool,
    },

    /// Returned when a train or test partition is empty.
    #[error("the {partition} partition is empty")]
    EmptyPartition {
        /// `"train"` or `"test"`.
        partition: &'static str,
    },

    /// Returned when no hour bucket holds the minimum share of records.
    #[error("no hour of day holds at least {min_hour_share} of the records")]
    NoQualifyingHour {
        /// The configured minimum share.
        min_hour_share: f64,
    },

    /// Returned when calibration data holds too few detections.
    #[error("calibration needs at least {min_positives} detections, got {n_positives}")]
    InsufficientPositives {
        /// Detections present.
        n_positives: usize,
        /// Configured minimum.
        min_positives: usize,
    },

    /// Returned when calibration data holds no non-detections.
    #[error("calibration data contains no non-detections")]
    NoNegatives,

    /// Returned when the raw predictions span no range.
    #[error("raw predictions span a degenerate range [{lo}, {hi}]")]
    DegenerateRange {
        /// Smallest raw prediction.
        lo: f64,
        /// Largest raw prediction.
        hi: f64,
    },

    /// Returned when penalized Fisher scoring does not converge.
    #[error("calibration did not converge after {iterations} iterations")]
    CalibrationNotConverged {
        /// Iterations performed.
        iterations: usize,
    },

    /// Returned when the calibration system cannot be solved.
    #[error("calibration failed: {reason}")]
    CalibrationFailed {
        /// Human-readable cause.
        reason: String,
    },

    /// Returned when model encoding fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when model decoding fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when the artifact cannot be written.
    #[error("cannot write model to {path}")]
    WriteModel {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the artifact cannot be read.
    #[error("cannot read model from {path}")]
    ReadModel {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the artifact was written by an incompatible format version.
    #[error("model at {path} has format version {found}, expected {expected}")]
    IncompatibleModelVersion {
        /// Supported version.
        expected: u32,
        /// Version found in the file.
        found: u32,
        /// Path of the artifact.
        path: PathBuf,
    },
}

fn class_label(detected: &bool) -> &'static str {
    if *detected { "detections" } else { "non-detections" }
}

impl ModelError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Survey(e) if e.is_configuration() => ErrorKind::Configuration,
            ModelError::Survey(_) => ErrorKind::DataQuality,
            ModelError::Forest(e) if e.is_configuration() => ErrorKind::Configuration,
            ModelError::Forest(_) => ErrorKind::DataQuality,
            ModelError::InvalidDegreesOfFreedom { .. }
            | ModelError::InvalidCalibrationParameter { .. }
            | ModelError::InvalidThresholdCount { .. }
            | ModelError::InvalidGridSize { .. }
            | ModelError::InvalidHourShare { .. }
            | ModelError::UnknownCovariate { .. }
            | ModelError::SurfaceSchemaMismatch { .. }
            | ModelError::HabitatOrderMismatch { .. }
            | ModelError::GridWidthMismatch { .. } => ErrorKind::Configuration,
            ModelError::NonFiniteGridValue { .. }
            | ModelError::EmptyInput { .. }
            | ModelError::LengthMismatch { .. }
            | ModelError::NonFinitePrediction { .. }
            | ModelError::SingleClassLabels { .. }
            | ModelError::EmptyPartition { .. }
            | ModelError::NoQualifyingHour { .. } => ErrorKind::DataQuality,
            ModelError::InsufficientPositives { .. }
            | ModelError::NoNegatives
            | ModelError::DegenerateRange { .. }
            | ModelError::CalibrationNotConverged { .. }
            | ModelError::CalibrationFailed { .. } => ErrorKind::Numerical,
            ModelError::SerializeModel { .. }
            | ModelError::DeserializeModel { .. }
            | ModelError::WriteModel { .. }
            | ModelError::ReadModel { .. }
            | ModelError::IncompatibleModelVersion { .. } => ErrorKind::Io,
        }
    }
}
