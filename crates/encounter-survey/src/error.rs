//! Error types for encounter-survey.

/// Errors from survey data construction, spatial indexing, and sampling.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    /// Returned when the hexagon spacing is non-positive, non-finite, or
    /// larger than half the circumference.
    #[error("hexagon spacing must be finite and in (0, {max_km}] km, got {spacing_km}")]
    InvalidSpacing {
        /// The spacing supplied, in kilometres.
        spacing_km: f64,
        /// Half the circumference for the configured radius.
        max_km: f64,
    },

    /// Returned when the sphere radius is non-positive or non-finite.
    #[error("earth radius must be finite and positive, got {radius_km} km")]
    InvalidEarthRadius {
        /// The radius supplied, in kilometres.
        radius_km: f64,
    },

    /// Returned when a coordinate is non-finite or outside the valid range.
    #[error("invalid coordinate (latitude {latitude}, longitude {longitude})")]
    InvalidCoordinate {
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },

    /// Returned when a day of year is outside 1..=366.
    #[error("day of year must be in 1..=366, got {day_of_year}")]
    InvalidDayOfYear {
        /// The day supplied.
        day_of_year: u16,
    },

    /// Returned when the train fraction is not strictly between 0 and 1.
    #[error("train fraction must be in (0, 1), got {fraction}")]
    InvalidTrainFraction {
        /// The fraction supplied.
        fraction: f64,
    },

    /// Returned when a covariate name appears twice in a schema.
    #[error("duplicate covariate name \"{name}\"")]
    DuplicateCovariate {
        /// The repeated name.
        name: String,
    },

    /// Returned when an observation's covariate vector does not match the schema width.
    #[error("observation {index} has {got} covariates, schema has {expected}")]
    SchemaWidthMismatch {
        /// Zero-based index of the offending observation.
        index: usize,
        /// Schema width.
        expected: usize,
        /// Covariate count of the observation.
        got: usize,
    },

    /// Returned when a complete feature matrix is requested but a value is missing.
    #[error("observation {index} is missing covariate \"{covariate}\"")]
    MissingCovariate {
        /// Zero-based index of the offending observation.
        index: usize,
        /// Name of the missing covariate.
        covariate: String,
    },

    /// Returned when a stage receives zero observations.
    #[error("no observations to process")]
    EmptyDataset,

    /// Returned when every observation is dropped for missing covariates.
    #[error("all {n_dropped} observations have missing covariates")]
    NoCompleteObservations {
        /// Number of observations dropped.
        n_dropped: usize,
    },
}

impl SurveyError {
    /// Return `true` for errors caused by invalid parameters rather than by
    /// the records themselves.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SurveyError::InvalidSpacing { .. }
                | SurveyError::InvalidEarthRadius { .. }
                | SurveyError::InvalidCoordinate { .. }
                | SurveyError::InvalidTrainFraction { .. }
                | SurveyError::DuplicateCovariate { .. }
                | SurveyError::SchemaWidthMismatch { .. }
        )
    }
}
