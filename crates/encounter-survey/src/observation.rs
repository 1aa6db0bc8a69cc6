//! Survey records and the covariate schema they share.

use std::collections::HashSet;

use crate::SurveyError;
use crate::geo::GeoPoint;

/// Start time of the survey, decimal hours in [0, 24).
pub const HOURS_OF_DAY: &str = "hours_of_day";
/// Survey duration in minutes.
pub const DURATION_MINUTES: &str = "duration_minutes";
/// Distance travelled during the survey, in kilometres.
pub const EFFORT_DISTANCE_KM: &str = "effort_distance_km";
/// Number of observers in the party.
pub const NUMBER_OBSERVERS: &str = "number_observers";
/// Observer calibration index.
pub const CCI: &str = "cci";
/// Calendar year as a covariate.
pub const YEAR: &str = "year";
/// Day of year (1..=366) as a covariate.
pub const DAY_OF_YEAR: &str = "day_of_year";

/// Cumulative day counts at the start of each month in a non-leap year.
const MONTH_STARTS: [u16; 12] = [1, 32, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

/// A survey (checklist) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ChecklistId(String);

impl ChecklistId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChecklistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observation date as calendar year and day of year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct SurveyDate {
    year: i32,
    day_of_year: u16,
}

impl SurveyDate {
    /// Create a validated date.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidDayOfYear`] unless `day_of_year` is in 1..=366.
    pub fn new(year: i32, day_of_year: u16) -> Result<Self, SurveyError> {
        if !(1..=366).contains(&day_of_year) {
            return Err(SurveyError::InvalidDayOfYear { day_of_year });
        }
        Ok(Self { year, day_of_year })
    }

    /// Return the calendar year.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Return the day of year.
    #[must_use]
    pub fn day_of_year(&self) -> u16 {
        self.day_of_year
    }

    /// Zero-based calendar week, `(day_of_year - 1) / 7` (0..=52).
    #[must_use]
    pub fn week(&self) -> u16 {
        (self.day_of_year - 1) / 7
    }

    /// One-based month on a non-leap calendar; day 366 falls in December.
    #[must_use]
    pub fn month(&self) -> u16 {
        let idx = MONTH_STARTS.partition_point(|&start| start <= self.day_of_year);
        idx as u16
    }
}

/// Ordered covariate names shared by every observation in a set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CovariateSchema {
    names: Vec<String>,
}

impl CovariateSchema {
    /// Create a schema from ordered, unique names.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::DuplicateCovariate`] if a name repeats.
    pub fn new(names: Vec<String>) -> Result<Self, SurveyError> {
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(SurveyError::DuplicateCovariate { name: name.clone() });
            }
        }
        Ok(Self { names })
    }

    /// Return the names in column order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Return the column index of `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Return the number of covariates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Return `true` if the schema has no covariates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One survey record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Observation {
    /// Survey identifier.
    pub id: ChecklistId,
    /// Survey location.
    pub location: GeoPoint,
    /// Survey date.
    pub date: SurveyDate,
    /// Covariate values in schema order; `None` marks a missing value.
    pub covariates: Vec<Option<f64>>,
    /// Whether the species was detected.
    pub detected: bool,
}

impl Observation {
    /// Return `true` when no covariate is missing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.covariates.iter().all(Option::is_some)
    }
}

/// A schema together with the observations that follow it.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    schema: CovariateSchema,
    observations: Vec<Observation>,
}

impl ObservationSet {
    /// Create a set, checking every covariate vector against the schema width.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::SchemaWidthMismatch`] for the first observation
    /// whose covariate count differs from the schema.
    pub fn new(schema: CovariateSchema, observations: Vec<Observation>) -> Result<Self, SurveyError> {
        for (index, obs) in observations.iter().enumerate() {
            if obs.covariates.len() != schema.len() {
                return Err(SurveyError::SchemaWidthMismatch {
                    index,
                    expected: schema.len(),
                    got: obs.covariates.len(),
                });
            }
        }
        Ok(Self {
            schema,
            observations,
        })
    }

    /// Build a set from observations already known to match `schema`.
    pub(crate) fn from_validated(schema: CovariateSchema, observations: Vec<Observation>) -> Self {
        Self {
            schema,
            observations,
        }
    }

    /// Return the covariate schema.
    #[must_use]
    pub fn schema(&self) -> &CovariateSchema {
        &self.schema
    }

    /// Return the observations in order.
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Return the number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Return `true` if the set holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Fraction of observations with a detection; 0 for an empty set.
    #[must_use]
    pub fn prevalence(&self) -> f64 {
        if self.observations.is_empty() {
            return 0.0;
        }
        let n_detected = self.observations.iter().filter(|o| o.detected).count();
        n_detected as f64 / self.observations.len() as f64
    }

    /// Detection labels in observation order.
    #[must_use]
    pub fn labels(&self) -> Vec<bool> {
        self.observations.iter().map(|o| o.detected).collect()
    }

    /// Row-major covariate matrix.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::MissingCovariate`] for the first missing value.
    pub fn feature_matrix(&self) -> Result<Vec<Vec<f64>>, SurveyError> {
        self.observations
            .iter()
            .enumerate()
            .map(|(index, obs)| {
                obs.covariates
                    .iter()
                    .enumerate()
                    .map(|(c, v)| {
                        v.ok_or_else(|| SurveyError::MissingCovariate {
                            index,
                            covariate: self.schema.names[c].clone(),
                        })
                    })
                    .collect()
            })
            .collect()
    }
}
