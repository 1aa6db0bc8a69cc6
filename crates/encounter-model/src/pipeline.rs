//! End-to-end fitting: subsample, split, train, calibrate, assess, explain.

use encounter_forest::{ForestConfig, OobMode, RankedCovariate};
use encounter_survey::{
    BalancedSubsampler, DatasetSplitter, HOURS_OF_DAY, HexGridIndexer, ObservationSet,
    RandomSource, SubsampleSummary, TimeBucket,
};
use tracing::{info, instrument, warn};

use crate::artifact::TrainedModel;
use crate::assess::{AssessmentReport, Assessor};
use crate::calibration::Calibrator;
use crate::dependence::{DependenceAnalyzer, DependenceCurve, PeakTime};
use crate::error::ModelError;
use crate::surface::ReferenceEffort;

/// Start time used for the reference effort when the model has no
/// time-of-day covariate.
const FALLBACK_HOURS_OF_DAY: f64 = 7.0;

/// Settings for one pipeline run.
///
/// # Defaults
///
/// | Parameter         | Default      |
/// |-------------------|--------------|
/// | `seed`            | 42           |
/// | `spacing_km`      | 5.0          |
/// | `time_bucket`     | `YearWeek`   |
/// | `train_fraction`  | 0.8          |
/// | `n_trees`         | 1000         |
/// | `max_depth`       | None         |
/// | `calibration_df`  | 5            |
/// | `n_thresholds`    | 101          |
/// | `min_hour_share`  | 0.01         |
/// | `grid_resolution` | 25           |
/// | `top_covariates`  | 6            |
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    seed: u64,
    spacing_km: f64,
    time_bucket: TimeBucket,
    train_fraction: f64,
    n_trees: usize,
    max_depth: Option<usize>,
    calibration_df: usize,
    n_thresholds: usize,
    min_hour_share: f64,
    grid_resolution: usize,
    top_covariates: usize,
}

impl PipelineConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seed: 42,
            spacing_km: 5.0,
            time_bucket: TimeBucket::YearWeek,
            train_fraction: 0.8,
            n_trees: 1000,
            max_depth: None,
            calibration_df: 5,
            n_thresholds: 101,
            min_hour_share: 0.01,
            grid_resolution: 25,
            top_covariates: 6,
        }
    }

    /// Set the master seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the hexagon spacing used for spatial strata.
    #[must_use]
    pub fn with_spacing_km(mut self, spacing_km: f64) -> Self {
        self.spacing_km = spacing_km;
        self
    }

    /// Set the temporal bucketing of strata.
    #[must_use]
    pub fn with_time_bucket(mut self, time_bucket: TimeBucket) -> Self {
        self.time_bucket = time_bucket;
        self
    }

    /// Set the training fraction.
    #[must_use]
    pub fn with_train_fraction(mut self, train_fraction: f64) -> Self {
        self.train_fraction = train_fraction;
        self
    }

    /// Set the number of trees.
    #[must_use]
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the maximum tree depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the calibration spline's degrees of freedom.
    #[must_use]
    pub fn with_calibration_df(mut self, calibration_df: usize) -> Self {
        self.calibration_df = calibration_df;
        self
    }

    /// Set the number of candidate assessment thresholds.
    #[must_use]
    pub fn with_n_thresholds(mut self, n_thresholds: usize) -> Self {
        self.n_thresholds = n_thresholds;
        self
    }

    /// Set the minimum hour share for the peak time of day.
    #[must_use]
    pub fn with_min_hour_share(mut self, min_hour_share: f64) -> Self {
        self.min_hour_share = min_hour_share;
        self
    }

    /// Set the partial-dependence grid size.
    #[must_use]
    pub fn with_grid_resolution(mut self, grid_resolution: usize) -> Self {
        self.grid_resolution = grid_resolution;
        self
    }

    /// Set how many top covariates get dependence curves.
    #[must_use]
    pub fn with_top_covariates(mut self, top_covariates: usize) -> Self {
        self.top_covariates = top_covariates;
        self
    }

    /// Return the master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Run the full pipeline on `set`.
    ///
    /// A single [`RandomSource`] seeded from `seed` drives subsampling,
    /// splitting, and the forest seed, in that order. Calibration is fit on
    /// out-of-bag predictions of the training rows; assessment uses only the
    /// test rows.
    ///
    /// # Errors
    ///
    /// | Variant                            | When                                          |
    /// |------------------------------------|-----------------------------------------------|
    /// | [`ModelError::Survey`]             | invalid spacing or fraction, empty input      |
    /// | [`ModelError::EmptyPartition`]     | the train or test partition is empty          |
    /// | [`ModelError::Forest`]             | invalid forest settings or training data      |
    /// | calibration variants               | see [`Calibrator::fit`]                       |
    /// | assessment variants                | see [`Assessor::assess`]                      |
    /// | [`ModelError::NoQualifyingHour`]   | no hour bucket holds enough training rows     |
    #[instrument(skip_all, fields(n_input = set.len(), seed = self.seed))]
    pub fn run(&self, set: &ObservationSet) -> Result<PipelineOutput, ModelError> {
        let mut rng = RandomSource::new(self.seed);

        let grid = HexGridIndexer::new(self.spacing_km)?;
        let sampled = BalancedSubsampler::new(grid)
            .with_time_bucket(self.time_bucket)
            .sample(set, &mut rng)?;
        let subsample = sampled.summary().clone();

        let split = DatasetSplitter::new(self.train_fraction)?.split(sampled.observations(), &mut rng)?;
        if split.train.is_empty() {
            return Err(ModelError::EmptyPartition { partition: "train" });
        }
        if split.test.is_empty() {
            return Err(ModelError::EmptyPartition { partition: "test" });
        }

        let names = split.train.schema().names().to_vec();
        let train_rows = split.train.feature_matrix()?;
        let train_labels = split.train.labels();

        let fit = ForestConfig::new(self.n_trees)?
            .with_max_depth(self.max_depth)
            .with_seed(rng.next_seed())
            .with_oob_mode(OobMode::Enabled)
            .fit(&train_rows, &train_labels, &names)?;

        let ensemble = fit.ensemble();
        let calibration_input = match fit.oob_predictions() {
            Some(oob) => {
                if oob.n_oob_samples < train_rows.len() {
                    warn!(
                        n_uncovered = train_rows.len() - oob.n_oob_samples,
                        "rows without out-of-bag trees use in-bag predictions"
                    );
                }
                oob.probabilities
                    .iter()
                    .zip(&train_rows)
                    .map(|(p, row)| match p {
                        Some(p) => Ok(*p),
                        None => ensemble.predict_proba(row),
                    })
                    .collect::<Result<Vec<f64>, _>>()?
            }
            None => ensemble.predict_batch(&train_rows)?,
        };
        let calibration = Calibrator::new()
            .with_degrees_of_freedom(self.calibration_df)
            .fit(&calibration_input, &train_labels)?;

        let analyzer = DependenceAnalyzer::new()
            .with_grid_size(self.grid_resolution)
            .with_min_hour_share(self.min_hour_share);
        let importance = analyzer.variable_importance(ensemble);
        let curves = analyzer.top_curves(ensemble, &train_rows, self.top_covariates)?;
        let peak = if names.iter().any(|n| n == HOURS_OF_DAY) {
            Some(analyzer.peak_time_of_day(ensemble, &train_rows)?)
        } else {
            None
        };

        let year = split
            .train
            .observations()
            .iter()
            .map(|o| o.date.year())
            .max()
            .ok_or(ModelError::EmptyPartition { partition: "train" })?;
        let hours = peak.map_or(FALLBACK_HOURS_OF_DAY, |p| p.hours);
        let reference_effort = ReferenceEffort::standard(year, hours).restricted_to(&names);

        let model = TrainedModel::new(fit.into_ensemble(), calibration, reference_effort);
        let assessment = model.assess(&split.test, &Assessor::new().with_n_thresholds(self.n_thresholds))?;

        info!(
            n_train = split.train.len(),
            n_test = split.test.len(),
            n_dropped = split.n_dropped,
            auc = assessment.calibrated.auc,
            kappa = assessment.calibrated.kappa,
            "pipeline finished"
        );

        Ok(PipelineOutput {
            model,
            subsample,
            n_train: split.train.len(),
            n_test: split.test.len(),
            n_dropped: split.n_dropped,
            assessment,
            importance,
            curves,
            peak,
            test: split.test,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Ensemble, calibration, and reference effort.
    pub model: TrainedModel,
    /// Effect of balanced subsampling.
    pub subsample: SubsampleSummary,
    /// Training rows.
    pub n_train: usize,
    /// Test rows.
    pub n_test: usize,
    /// Rows dropped for missing covariates.
    pub n_dropped: usize,
    /// Raw and calibrated accuracy on the test rows.
    pub assessment: AssessmentReport,
    /// Covariates ranked by importance.
    pub importance: Vec<RankedCovariate>,
    /// Dependence curves for the top covariates.
    pub curves: Vec<DependenceCurve>,
    /// Best-supported start time, when the model has a time-of-day covariate.
    pub peak: Option<PeakTime>,
    /// Held-out test rows.
    pub test: ObservationSet,
}
