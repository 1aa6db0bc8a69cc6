//! Covariate importance and partial dependence.

use encounter_forest::{RankedCovariate, TrainedEnsemble};
use encounter_survey::HOURS_OF_DAY;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::error::ModelError;

/// Time-of-day grid: 10-minute steps over 24 hours.
const TIME_OF_DAY_STEPS: usize = 144;

/// One point of a partial-dependence curve.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DependencePoint {
    /// Value the covariate was fixed to.
    pub value: f64,
    /// Mean predicted probability over all rows.
    pub mean_probability: f64,
}

/// Marginal model response to one covariate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DependenceCurve {
    /// Covariate name.
    pub covariate: String,
    /// Points in increasing covariate value.
    pub points: Vec<DependencePoint>,
}

/// The best-supported time of day to survey.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PeakTime {
    /// Start time in decimal hours.
    pub hours: f64,
    /// Mean predicted probability at that start time.
    pub encounter_rate: f64,
    /// Share of rows in the peak's hour bucket.
    pub hour_share: f64,
}

/// Evaluation values for `covariate`: 10-minute steps over 0-24 h for
/// the time-of-day covariate, otherwise `grid_size` evenly spaced values
/// over the empirical range.
fn grid_values(covariate: &str, column: impl Iterator<Item = f64>, grid_size: usize) -> Vec<f64> {
    if covariate == HOURS_OF_DAY {
        return (0..TIME_OF_DAY_STEPS)
            .map(|i| 24.0 * i as f64 / TIME_OF_DAY_STEPS as f64)
            .collect();
    }
    let (lo, hi) = column.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo == hi {
        return vec![lo];
    }
    (0..grid_size)
        .map(|i| lo + (hi - lo) * i as f64 / (grid_size - 1) as f64)
        .collect()
}

/// Partial dependence of the ensemble on one covariate.
///
/// For each grid value the covariate is fixed in every row, the rows are
/// re-predicted, and the predictions are averaged in row order. Grid values
/// are evaluated in parallel.
///
/// # Errors
///
/// | Variant                                    | When                                 |
/// |--------------------------------------------|--------------------------------------|
/// | [`ModelError::InvalidGridSize`]            | `grid_size < 2`                      |
/// | [`ModelError::UnknownCovariate`]           | `covariate` is not in the ensemble   |
/// | [`ModelError::EmptyInput`]                 | `rows` is empty                      |
/// | [`ModelError::Forest`]                     | a row has the wrong width            |
#[instrument(skip(ensemble, rows), fields(n_rows = rows.len()))]
pub fn partial_dependence(
    ensemble: &TrainedEnsemble,
    covariate: &str,
    rows: &[Vec<f64>],
    grid_size: usize,
) -> Result<DependenceCurve, ModelError> {
    if grid_size < 2 {
        return Err(ModelError::InvalidGridSize { grid_size });
    }
    let column = ensemble
        .covariate_names()
        .iter()
        .position(|n| n == covariate)
        .ok_or_else(|| ModelError::UnknownCovariate {
            name: covariate.to_string(),
        })?;
    if rows.is_empty() {
        return Err(ModelError::EmptyInput {
            stage: "partial dependence",
        });
    }

    let values = grid_values(
        covariate,
        rows.iter().filter_map(|r| r.get(column).copied()),
        grid_size,
    );

    let points = values
        .into_par_iter()
        .map(|value| {
            let mut scratch = Vec::with_capacity(ensemble.n_covariates());
            let mut sum = 0.0;
            for row in rows {
                scratch.clear();
                scratch.extend_from_slice(row);
                if let Some(slot) = scratch.get_mut(column) {
                    *slot = value;
                }
                sum += ensemble.predict_proba(&scratch)?;
            }
            Ok::<_, ModelError>(DependencePoint {
                value,
                mean_probability: sum / rows.len() as f64,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(covariate, n_points = points.len(), "partial dependence computed");
    Ok(DependenceCurve {
        covariate: covariate.to_string(),
        points,
    })
}

/// Importance ranking, dependence curves, and the guarded time-of-day peak.
///
/// # Defaults
///
/// | Parameter        | Default |
/// |------------------|---------|
/// | `grid_size`      | 25      |
/// | `min_hour_share` | 0.01    |
#[derive(Debug, Clone)]
pub struct DependenceAnalyzer {
    grid_size: usize,
    min_hour_share: f64,
}

impl DependenceAnalyzer {
    /// Create an analyzer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grid_size: 25,
            min_hour_share: 0.01,
        }
    }

    /// Set the number of grid points for non-time covariates.
    #[must_use]
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Set the minimum share of rows an hour bucket needs to hold a peak.
    #[must_use]
    pub fn with_min_hour_share(mut self, min_hour_share: f64) -> Self {
        self.min_hour_share = min_hour_share;
        self
    }

    /// Covariates ranked by total impurity decrease.
    #[must_use]
    pub fn variable_importance(&self, ensemble: &TrainedEnsemble) -> Vec<RankedCovariate> {
        ensemble.importance()
    }

    /// Partial dependence on one covariate at this analyzer's grid size.
    ///
    /// # Errors
    ///
    /// See [`partial_dependence`].
    pub fn curve(
        &self,
        ensemble: &TrainedEnsemble,
        covariate: &str,
        rows: &[Vec<f64>],
    ) -> Result<DependenceCurve, ModelError> {
        partial_dependence(ensemble, covariate, rows, self.grid_size)
    }

    /// Curves for the `n` most important covariates, in importance order.
    ///
    /// # Errors
    ///
    /// See [`partial_dependence`].
    #[instrument(skip(self, ensemble, rows), fields(n_rows = rows.len()))]
    pub fn top_curves(
        &self,
        ensemble: &TrainedEnsemble,
        rows: &[Vec<f64>],
        n: usize,
    ) -> Result<Vec<DependenceCurve>, ModelError> {
        self.variable_importance(ensemble)
            .iter()
            .take(n)
            .map(|ranked| self.curve(ensemble, &ranked.name, rows))
            .collect()
    }

    /// Start time with the highest partial dependence among hour buckets
    /// (`floor(hours) mod 24`) that hold at least `min_hour_share` of `rows`.
    ///
    /// Ties keep the earliest time.
    ///
    /// # Errors
    ///
    /// | Variant                              | When                                    |
    /// |--------------------------------------|-----------------------------------------|
    /// | [`ModelError::InvalidHourShare`]     | share outside [0, 1)                    |
    /// | [`ModelError::UnknownCovariate`]     | no time-of-day covariate in the model   |
    /// | [`ModelError::NoQualifyingHour`]     | no hour bucket holds enough rows        |
    /// | others                               | see [`partial_dependence`]              |
    #[instrument(skip(self, ensemble, rows), fields(n_rows = rows.len(), min_hour_share = self.min_hour_share))]
    pub fn peak_time_of_day(
        &self,
        ensemble: &TrainedEnsemble,
        rows: &[Vec<f64>],
    ) -> Result<PeakTime, ModelError> {
        if !(0.0..1.0).contains(&self.min_hour_share) {
            return Err(ModelError::InvalidHourShare {
                share: self.min_hour_share,
            });
        }
        let curve = partial_dependence(ensemble, HOURS_OF_DAY, rows, self.grid_size)?;
        let column = ensemble
            .covariate_names()
            .iter()
            .position(|n| n == HOURS_OF_DAY)
            .ok_or_else(|| ModelError::UnknownCovariate {
                name: HOURS_OF_DAY.to_string(),
            })?;

        let mut counts = [0usize; 24];
        for row in rows {
            if let Some(&h) = row.get(column) {
                counts[hour_bucket(h)] += 1;
            }
        }
        let shares: Vec<f64> = counts
            .iter()
            .map(|&c| c as f64 / rows.len() as f64)
            .collect();

        let mut peak: Option<PeakTime> = None;
        for point in &curve.points {
            let share = shares[hour_bucket(point.value)];
            if share < self.min_hour_share {
                continue;
            }
            if peak.is_none_or(|p| point.mean_probability > p.encounter_rate) {
                peak = Some(PeakTime {
                    hours: point.value,
                    encounter_rate: point.mean_probability,
                    hour_share: share,
                });
            }
        }

        let peak = peak.ok_or(ModelError::NoQualifyingHour {
            min_hour_share: self.min_hour_share,
        })?;
        info!(
            hours = peak.hours,
            encounter_rate = peak.encounter_rate,
            hour_share = peak.hour_share,
            "peak time of day"
        );
        Ok(peak)
    }
}

impl Default for DependenceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn hour_bucket(hours: f64) -> usize {
    (hours.floor() as i64).rem_euclid(24) as usize
}
