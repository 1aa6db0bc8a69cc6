//! Spatiotemporal balanced subsampling.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{info, instrument};

use crate::SurveyError;
use crate::hexgrid::{CellId, HexGridIndexer};
use crate::observation::{ObservationSet, SurveyDate};
use crate::random::RandomSource;

/// How survey dates are grouped into time buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeBucket {
    /// Calendar week within each year.
    #[default]
    YearWeek,
    /// Calendar week, pooled across years.
    Week,
    /// Calendar month within each year.
    Month,
}

impl TimeBucket {
    /// Return the bucket a date falls into.
    #[must_use]
    pub fn key(self, date: SurveyDate) -> BucketKey {
        match self {
            TimeBucket::YearWeek => BucketKey {
                year: Some(date.year()),
                period: date.week(),
            },
            TimeBucket::Week => BucketKey {
                year: None,
                period: date.week(),
            },
            TimeBucket::Month => BucketKey {
                year: Some(date.year()),
                period: date.month(),
            },
        }
    }
}

/// A time bucket: an optional year and a period (week or month) within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    /// Year, or `None` when buckets pool years.
    pub year: Option<i32>,
    /// Week (zero-based) or month (one-based) index.
    pub period: u16,
}

/// Composite grouping key used during subsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StratumKey {
    /// Detection label.
    pub detected: bool,
    /// Time bucket of the survey date.
    pub time_bucket: BucketKey,
    /// Hexagonal cell of the survey location.
    pub cell: CellId,
}

/// Counts and prevalence before and after subsampling.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubsampleSummary {
    /// Number of input observations.
    pub n_input: usize,
    /// Number of non-empty strata, equal to the output size.
    pub n_strata: usize,
    /// Detection fraction of the input.
    pub prevalence_before: f64,
    /// Detection fraction of the output.
    pub prevalence_after: f64,
}

/// The subsampled observations, one per non-empty stratum, in input order.
#[derive(Debug, Clone)]
pub struct SampledDataset {
    observations: ObservationSet,
    summary: SubsampleSummary,
}

impl SampledDataset {
    /// Return the retained observations.
    #[must_use]
    pub fn observations(&self) -> &ObservationSet {
        &self.observations
    }

    /// Return the before/after summary.
    #[must_use]
    pub fn summary(&self) -> &SubsampleSummary {
        &self.summary
    }

    /// Consume the dataset and return the retained observations.
    #[must_use]
    pub fn into_observations(self) -> ObservationSet {
        self.observations
    }
}

/// Draws one observation per (label, time bucket, cell) stratum.
///
/// # Defaults
///
/// | Parameter     | Default    |
/// |---------------|------------|
/// | `time_bucket` | `YearWeek` |
#[derive(Debug, Clone)]
pub struct BalancedSubsampler {
    grid: HexGridIndexer,
    time_bucket: TimeBucket,
}

impl BalancedSubsampler {
    /// Create a subsampler over the given grid.
    #[must_use]
    pub fn new(grid: HexGridIndexer) -> Self {
        Self {
            grid,
            time_bucket: TimeBucket::default(),
        }
    }

    /// Set the time-bucketing policy.
    #[must_use]
    pub fn with_time_bucket(mut self, time_bucket: TimeBucket) -> Self {
        self.time_bucket = time_bucket;
        self
    }

    /// Return the grid used for spatial strata.
    #[must_use]
    pub fn grid(&self) -> &HexGridIndexer {
        &self.grid
    }

    /// Return the stratum key of every observation, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidCoordinate`] if a location cannot be indexed.
    pub fn strata(&self, set: &ObservationSet) -> Result<Vec<StratumKey>, SurveyError> {
        set.observations()
            .iter()
            .map(|obs| {
                Ok(StratumKey {
                    detected: obs.detected,
                    time_bucket: self.time_bucket.key(obs.date),
                    cell: self
                        .grid
                        .cell_id(obs.location.latitude, obs.location.longitude)?,
                })
            })
            .collect()
    }

    /// Keep exactly one uniformly drawn observation per non-empty stratum.
    ///
    /// Strata are visited in key order and single-member strata consume no
    /// randomness, so the result depends only on the input, the grid
    /// spacing, and the state of `rng`.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                              |
    /// |-------------------------------------|-----------------------------------|
    /// | [`SurveyError::EmptyDataset`]       | `set` has no observations         |
    /// | [`SurveyError::InvalidCoordinate`]  | a location cannot be indexed      |
    #[instrument(skip_all, fields(n_input = set.len()))]
    pub fn sample(
        &self,
        set: &ObservationSet,
        rng: &mut RandomSource,
    ) -> Result<SampledDataset, SurveyError> {
        if set.is_empty() {
            return Err(SurveyError::EmptyDataset);
        }

        let keys = self.strata(set)?;
        let mut groups: BTreeMap<StratumKey, Vec<usize>> = BTreeMap::new();
        for (i, key) in keys.into_iter().enumerate() {
            groups.entry(key).or_default().push(i);
        }

        let mut chosen: Vec<usize> = groups
            .values()
            .map(|members| match members.as_slice() {
                [only] => *only,
                _ => members[rng.gen_range(0..members.len())],
            })
            .collect();
        chosen.sort_unstable();

        let observations = chosen
            .iter()
            .map(|&i| set.observations()[i].clone())
            .collect();
        let sampled = ObservationSet::from_validated(set.schema().clone(), observations);

        let summary = SubsampleSummary {
            n_input: set.len(),
            n_strata: sampled.len(),
            prevalence_before: set.prevalence(),
            prevalence_after: sampled.prevalence(),
        };
        info!(
            n_input = summary.n_input,
            n_strata = summary.n_strata,
            prevalence_before = summary.prevalence_before,
            prevalence_after = summary.prevalence_after,
            "balanced subsample drawn"
        );

        Ok(SampledDataset {
            observations: sampled,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::observation::{ChecklistId, CovariateSchema, Observation};

    fn obs(id: usize, lat: f64, lon: f64, doy: u16, detected: bool) -> Observation {
        Observation {
            id: ChecklistId::new(format!("S{id}")),
            location: GeoPoint::new(lat, lon).unwrap(),
            date: SurveyDate::new(2020, doy).unwrap(),
            covariates: vec![Some(id as f64)],
            detected,
        }
    }

    fn set(observations: Vec<Observation>) -> ObservationSet {
        ObservationSet::new(CovariateSchema::new(vec!["x".into()]).unwrap(), observations).unwrap()
    }

    fn subsampler() -> BalancedSubsampler {
        BalancedSubsampler::new(HexGridIndexer::new(5.0).unwrap())
    }

    #[test]
    fn one_per_stratum_in_input_order() {
        // Three at the same place and week (one stratum), one elsewhere,
        // one detection at the first place.
        let input = set(vec![
            obs(0, 42.0, -76.0, 10, false),
            obs(1, 42.0, -76.0, 11, false),
            obs(2, 42.0, -76.0, 12, false),
            obs(3, 45.0, -70.0, 10, false),
            obs(4, 42.0, -76.0, 10, true),
        ]);
        let sampled = subsampler().sample(&input, &mut RandomSource::new(1)).unwrap();
        assert_eq!(sampled.summary().n_strata, 3);
        let ids: Vec<&str> = sampled
            .observations()
            .observations()
            .iter()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.ends_with(&["S3", "S4"]));
        assert!(["S0", "S1", "S2"].contains(&ids[0]));
    }

    #[test]
    fn singleton_strata_kept_unchanged() {
        let input = set(vec![obs(0, 10.0, 10.0, 1, true), obs(1, -10.0, 100.0, 200, false)]);
        let sampled = subsampler().sample(&input, &mut RandomSource::new(3)).unwrap();
        assert_eq!(sampled.observations().observations(), input.observations());
    }

    #[test]
    fn time_bucket_policies() {
        let a = SurveyDate::new(2019, 10).unwrap();
        let b = SurveyDate::new(2020, 10).unwrap();
        assert_ne!(TimeBucket::YearWeek.key(a), TimeBucket::YearWeek.key(b));
        assert_eq!(TimeBucket::Week.key(a), TimeBucket::Week.key(b));
        assert_eq!(
            TimeBucket::Month.key(SurveyDate::new(2020, 1).unwrap()),
            TimeBucket::Month.key(SurveyDate::new(2020, 31).unwrap())
        );
    }

    #[test]
    fn prevalence_rises_under_clustered_non_detections() {
        // 200 non-detections piled into one cell-week, 20 detections spread
        // across distinct cells.
        let mut records = Vec::new();
        for i in 0..200 {
            records.push(obs(i, 42.0, -76.0, 50, false));
        }
        for i in 0..20 {
            records.push(obs(200 + i, 30.0 + i as f64, -100.0, 50, true));
        }
        let input = set(records);
        let sampled = subsampler().sample(&input, &mut RandomSource::new(11)).unwrap();
        let summary = sampled.summary();
        assert_eq!(summary.n_strata, 21);
        assert!(summary.prevalence_after >= summary.prevalence_before);
        assert!((summary.prevalence_after - 20.0 / 21.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_rejected() {
        let err = subsampler()
            .sample(&set(vec![]), &mut RandomSource::new(0))
            .unwrap_err();
        assert!(matches!(err, SurveyError::EmptyDataset));
    }
}
