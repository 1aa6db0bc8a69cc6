//! Calibration, assessment, and interpretation of encounter-rate models.
//!
//! Turns a trained probability forest into a usable encounter-rate model:
//! a monotone [`Calibrator`] fit on training predictions, an [`Assessor`]
//! that picks the Kappa-maximizing threshold on held-out data, a
//! [`DependenceAnalyzer`] for importance, partial dependence, and the
//! best-supported survey start time, and a [`SurfacePredictor`] that maps
//! calibrated rates over a habitat grid under a fixed reference effort.
//! [`PipelineConfig::run`] chains every stage from raw survey records to a
//! persisted [`TrainedModel`].

mod artifact;
mod assess;
mod calibration;
mod dependence;
mod error;
mod pipeline;
mod surface;

pub use artifact::TrainedModel;
pub use assess::{AssessmentReport, Assessor, ModelAssessment, ModelVariant};
pub use calibration::{CalibrationMap, Calibrator};
pub use dependence::{
    DependenceAnalyzer, DependenceCurve, DependencePoint, PeakTime, partial_dependence,
};
pub use error::{ErrorKind, ModelError};
pub use pipeline::{PipelineConfig, PipelineOutput};
pub use surface::{
    PredictionGrid, PredictionGridPoint, ReferenceEffort, SurfacePredictor, SurfaceSummary,
};
