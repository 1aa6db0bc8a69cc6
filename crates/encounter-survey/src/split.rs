//! Complete-case filtering and random train/test partitioning.

use rand::Rng;
use tracing::{info, instrument, warn};

use crate::SurveyError;
use crate::observation::{Observation, ObservationSet};
use crate::random::RandomSource;

/// Train and test partitions of a dataset.
#[derive(Debug, Clone)]
pub struct DataSplit {
    /// Observations used to fit the ensemble and calibration.
    pub train: ObservationSet,
    /// Held-out observations used only for assessment.
    pub test: ObservationSet,
    /// Observations dropped for having a missing covariate.
    pub n_dropped: usize,
}

/// Drops incomplete records, then assigns each remaining record to the
/// training set independently with probability `train_fraction`.
///
/// # Defaults
///
/// | Parameter        | Default |
/// |------------------|---------|
/// | `train_fraction` | 0.8     |
#[derive(Debug, Clone, Copy)]
pub struct DatasetSplitter {
    train_fraction: f64,
}

impl DatasetSplitter {
    /// Create a splitter.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidTrainFraction`] unless `0 < train_fraction < 1`.
    pub fn new(train_fraction: f64) -> Result<Self, SurveyError> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(SurveyError::InvalidTrainFraction {
                fraction: train_fraction,
            });
        }
        Ok(Self { train_fraction })
    }

    /// Return the training fraction.
    #[must_use]
    pub fn train_fraction(&self) -> f64 {
        self.train_fraction
    }

    /// Split `set` into train and test partitions.
    ///
    /// # Errors
    ///
    /// | Variant                                   | When                                  |
    /// |-------------------------------------------|---------------------------------------|
    /// | [`SurveyError::EmptyDataset`]             | `set` has no observations             |
    /// | [`SurveyError::NoCompleteObservations`]   | every observation has a missing value |
    #[instrument(skip_all, fields(n_input = set.len(), train_fraction = self.train_fraction))]
    pub fn split(&self, set: &ObservationSet, rng: &mut RandomSource) -> Result<DataSplit, SurveyError> {
        if set.is_empty() {
            return Err(SurveyError::EmptyDataset);
        }

        let (complete, incomplete): (Vec<&Observation>, Vec<&Observation>) =
            set.observations().iter().partition(|o| o.is_complete());
        let n_dropped = incomplete.len();
        if n_dropped > 0 {
            warn!(n_dropped, "dropped observations with missing covariates");
        }
        if complete.is_empty() {
            return Err(SurveyError::NoCompleteObservations { n_dropped });
        }

        let mut train = Vec::new();
        let mut test = Vec::new();
        for obs in complete {
            if rng.gen_bool(self.train_fraction) {
                train.push(obs.clone());
            } else {
                test.push(obs.clone());
            }
        }

        if train.is_empty() || test.is_empty() {
            warn!(n_train = train.len(), n_test = test.len(), "one partition is empty");
        }
        info!(n_train = train.len(), n_test = test.len(), n_dropped, "dataset split");

        let schema = set.schema().clone();
        Ok(DataSplit {
            train: ObservationSet::from_validated(schema.clone(), train),
            test: ObservationSet::from_validated(schema, test),
            n_dropped,
        })
    }
}

impl Default for DatasetSplitter {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::observation::{ChecklistId, CovariateSchema, SurveyDate};

    fn set_with(n: usize, missing_every: Option<usize>) -> ObservationSet {
        let observations = (0..n)
            .map(|i| Observation {
                id: ChecklistId::new(format!("S{i}")),
                location: GeoPoint::new(0.0, 0.0).unwrap(),
                date: SurveyDate::new(2020, 1).unwrap(),
                covariates: vec![
                    Some(i as f64),
                    match missing_every {
                        Some(k) if i % k == 0 => None,
                        _ => Some(1.0),
                    },
                ],
                detected: i % 2 == 0,
            })
            .collect();
        ObservationSet::new(
            CovariateSchema::new(vec!["a".into(), "b".into()]).unwrap(),
            observations,
        )
        .unwrap()
    }

    #[test]
    fn fraction_bounds() {
        assert!(DatasetSplitter::new(0.0).is_err());
        assert!(DatasetSplitter::new(1.0).is_err());
        assert!(DatasetSplitter::new(f64::NAN).is_err());
        assert!(DatasetSplitter::new(0.5).is_ok());
        assert!((DatasetSplitter::default().train_fraction() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn drops_incomplete_and_partitions_disjointly() {
        let set = set_with(1000, Some(10));
        let split = DatasetSplitter::default()
            .split(&set, &mut RandomSource::new(42))
            .unwrap();
        assert_eq!(split.n_dropped, 100);
        assert_eq!(split.train.len() + split.test.len(), 900);
        assert!(split.train.observations().iter().all(Observation::is_complete));
        let train_ids: std::collections::HashSet<_> =
            split.train.observations().iter().map(|o| o.id.clone()).collect();
        assert!(split.test.observations().iter().all(|o| !train_ids.contains(&o.id)));
        let frac = split.train.len() as f64 / 900.0;
        assert!((0.74..0.86).contains(&frac), "train fraction {frac}");
    }

    #[test]
    fn reproducible_for_same_seed() {
        let set = set_with(200, None);
        let splitter = DatasetSplitter::new(0.7).unwrap();
        let a = splitter.split(&set, &mut RandomSource::new(5)).unwrap();
        let b = splitter.split(&set, &mut RandomSource::new(5)).unwrap();
        assert_eq!(a.train.observations(), b.train.observations());
    }

    #[test]
    fn all_incomplete_is_an_error() {
        let set = set_with(5, Some(1));
        let err = DatasetSplitter::default()
            .split(&set, &mut RandomSource::new(0))
            .unwrap_err();
        assert!(matches!(err, SurveyError::NoCompleteObservations { n_dropped: 5 }));
    }
}
