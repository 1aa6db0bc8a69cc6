//! Survey records, equal-area hexagonal indexing, and balanced subsampling.
//!
//! Holds the observation data model shared by the pipeline, the seeded
//! [`RandomSource`] threaded through every stochastic stage, the
//! [`HexGridIndexer`] used for spatial strata, the [`BalancedSubsampler`]
//! that corrects spatial, temporal, and class imbalance, and the
//! [`DatasetSplitter`] that produces train/test partitions.

mod error;
mod geo;
mod hexgrid;
mod observation;
mod random;
mod split;
mod subsample;

pub use error::SurveyError;
pub use geo::GeoPoint;
pub use hexgrid::{AUTHALIC_RADIUS_KM, CellId, HexGridIndexer};
pub use observation::{
    CCI, ChecklistId, CovariateSchema, DAY_OF_YEAR, DURATION_MINUTES, EFFORT_DISTANCE_KM,
    HOURS_OF_DAY, NUMBER_OBSERVERS, Observation, ObservationSet, SurveyDate, YEAR,
};
pub use random::RandomSource;
pub use split::{DataSplit, DatasetSplitter};
pub use subsample::{
    BalancedSubsampler, BucketKey, SampledDataset, StratumKey, SubsampleSummary, TimeBucket,
};
