//! Encounter-rate surfaces under a fixed reference effort.

use std::collections::HashMap;

use encounter_survey::{
    DAY_OF_YEAR, DURATION_MINUTES, EFFORT_DISTANCE_KM, GeoPoint, HOURS_OF_DAY, NUMBER_OBSERVERS,
    YEAR,
};
use tracing::{info, instrument};

use crate::artifact::TrainedModel;
use crate::error::ModelError;

/// Day of year used by the standard profile (15 June in a non-leap year).
const STANDARD_DAY_OF_YEAR: f64 = 166.0;

/// Named effort values held fixed while predicting a surface.
///
/// Entries keep insertion order; setting an existing name replaces its value.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReferenceEffort {
    values: Vec<(String, f64)>,
}

impl ReferenceEffort {
    /// Create an empty profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard one-hour, one-kilometre, single-observer survey on
    /// 15 June of `year`, starting at `hours_of_day`.
    #[must_use]
    pub fn standard(year: i32, hours_of_day: f64) -> Self {
        Self::new()
            .with_value(DURATION_MINUTES, 60.0)
            .with_value(EFFORT_DISTANCE_KM, 1.0)
            .with_value(NUMBER_OBSERVERS, 1.0)
            .with_value(YEAR, f64::from(year))
            .with_value(DAY_OF_YEAR, STANDARD_DAY_OF_YEAR)
            .with_value(HOURS_OF_DAY, hours_of_day)
    }

    /// Set the value for `name`.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    /// Keep only the entries whose names appear in `names`.
    #[must_use]
    pub fn restricted_to(mut self, names: &[String]) -> Self {
        self.values.retain(|(n, _)| names.contains(n));
        self
    }

    /// Value for `name`, if set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no entries are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One location of a prediction grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionGridPoint {
    /// Point identifier.
    pub id: String,
    /// Point location.
    pub location: GeoPoint,
    /// Habitat covariates, ordered as the grid's habitat names.
    pub habitat: Vec<f64>,
    encounter_rate: Option<f64>,
}

impl PredictionGridPoint {
    /// Create a point with no encounter rate attached.
    #[must_use]
    pub fn new(id: impl Into<String>, location: GeoPoint, habitat: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            location,
            habitat,
            encounter_rate: None,
        }
    }

    /// Encounter rate attached by [`SurfacePredictor::apply`].
    #[must_use]
    pub fn encounter_rate(&self) -> Option<f64> {
        self.encounter_rate
    }
}

/// Locations and their habitat covariates.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionGrid {
    habitat_names: Vec<String>,
    points: Vec<PredictionGridPoint>,
}

impl PredictionGrid {
    /// Create a grid after checking every point's width.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::GridWidthMismatch`] if a point's habitat vector
    /// does not match `habitat_names`.
    pub fn new(
        habitat_names: Vec<String>,
        points: Vec<PredictionGridPoint>,
    ) -> Result<Self, ModelError> {
        if let Some((index, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| p.habitat.len() != habitat_names.len())
        {
            return Err(ModelError::GridWidthMismatch {
                index,
                expected: habitat_names.len(),
                got: p.habitat.len(),
            });
        }
        Ok(Self {
            habitat_names,
            points,
        })
    }

    /// Habitat covariate names.
    #[must_use]
    pub fn habitat_names(&self) -> &[String] {
        &self.habitat_names
    }

    /// Grid points in input order.
    #[must_use]
    pub fn points(&self) -> &[PredictionGridPoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the grid has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Summary of one surface prediction.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SurfaceSummary {
    /// Number of points predicted.
    pub n_points: usize,
    /// Mean encounter rate over the grid.
    pub mean_encounter_rate: f64,
    /// Smallest encounter rate.
    pub min_encounter_rate: f64,
    /// Largest encounter rate.
    pub max_encounter_rate: f64,
    /// Effort profile the surface was predicted under.
    pub reference_effort: ReferenceEffort,
}

/// Where a model covariate's value comes from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Effort(f64),
    Habitat(usize),
}

/// Predicts calibrated encounter rates on a grid under a fixed effort.
#[derive(Debug)]
pub struct SurfacePredictor<'a> {
    model: &'a TrainedModel,
    reference: ReferenceEffort,
}

impl<'a> SurfacePredictor<'a> {
    /// Create a predictor for `model` under `reference`.
    #[must_use]
    pub fn new(model: &'a TrainedModel, reference: ReferenceEffort) -> Self {
        Self { model, reference }
    }

    /// Return the reference effort.
    #[must_use]
    pub fn reference(&self) -> &ReferenceEffort {
        &self.reference
    }

    /// Resolve each model covariate to the effort profile or a habitat column.
    fn sources(&self, habitat_names: &[String]) -> Result<Vec<Source>, ModelError> {
        let model_names = self.model.covariate_names();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (name, _) in self.reference.iter() {
            *counts.entry(name).or_default() += 1;
        }
        for name in habitat_names {
            *counts.entry(name.as_str()).or_default() += 1;
        }

        let missing: Vec<String> = model_names
            .iter()
            .filter(|n| !counts.contains_key(n.as_str()))
            .cloned()
            .collect();
        let duplicated: Vec<String> = model_names
            .iter()
            .filter(|n| counts.get(n.as_str()).is_some_and(|&c| c > 1))
            .cloned()
            .collect();
        let mut unexpected: Vec<String> = counts
            .keys()
            .filter(|n| !model_names.iter().any(|m| m.as_str() == **n))
            .map(|n| (*n).to_string())
            .collect();
        unexpected.sort();

        if !missing.is_empty() || !duplicated.is_empty() || !unexpected.is_empty() {
            return Err(ModelError::SurfaceSchemaMismatch {
                missing,
                duplicated,
                unexpected,
            });
        }

        let expected: Vec<&String> = model_names
            .iter()
            .filter(|n| self.reference.get(n).is_none())
            .collect();
        if expected.iter().copied().ne(habitat_names.iter()) {
            return Err(ModelError::HabitatOrderMismatch {
                expected: expected.into_iter().cloned().collect(),
                got: habitat_names.to_vec(),
            });
        }

        model_names
            .iter()
            .map(|name| {
                if let Some(value) = self.reference.get(name) {
                    if !value.is_finite() {
                        return Err(ModelError::NonFiniteGridValue {
                            point_id: "reference effort".into(),
                            covariate: name.clone(),
                        });
                    }
                    return Ok(Source::Effort(value));
                }
                habitat_names
                    .iter()
                    .position(|h| h == name)
                    .map(Source::Habitat)
                    .ok_or_else(|| ModelError::UnknownCovariate { name: name.clone() })
            })
            .collect()
    }

    /// Predict and attach an encounter rate to every grid point.
    ///
    /// Rows are assembled in model covariate order from the reference profile
    /// and each point's habitat values, predicted with the ensemble, and
    /// calibrated.
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                             |
    /// |----------------------------------------|--------------------------------------------------|
    /// | [`ModelError::EmptyInput`]             | the grid has no points                           |
    /// | [`ModelError::SurfaceSchemaMismatch`]  | effort and habitat names do not partition the model covariates |
    /// | [`ModelError::HabitatOrderMismatch`]   | habitat columns are not in model covariate order |
    /// | [`ModelError::NonFiniteGridValue`]     | a used value is NaN or infinite                  |
    #[instrument(skip_all, fields(n_points = grid.len()))]
    pub fn apply(&self, grid: &mut PredictionGrid) -> Result<SurfaceSummary, ModelError> {
        if grid.is_empty() {
            return Err(ModelError::EmptyInput {
                stage: "surface prediction",
            });
        }
        let sources = self.sources(&grid.habitat_names)?;

        let mut rows = Vec::with_capacity(grid.len());
        for point in &grid.points {
            let row = sources
                .iter()
                .map(|&source| match source {
                    Source::Effort(v) => Ok(v),
                    Source::Habitat(j) => {
                        let v = point.habitat[j];
                        if v.is_finite() {
                            Ok(v)
                        } else {
                            Err(ModelError::NonFiniteGridValue {
                                point_id: point.id.clone(),
                                covariate: grid.habitat_names[j].clone(),
                            })
                        }
                    }
                })
                .collect::<Result<Vec<f64>, _>>()?;
            rows.push(row);
        }

        let rates = self.model.predict(&rows)?;
        for (point, &rate) in grid.points.iter_mut().zip(&rates) {
            point.encounter_rate = Some(rate);
        }

        let n = rates.len();
        let mean = rates.iter().sum::<f64>() / n as f64;
        let min = rates.iter().copied().fold(f64::INFINITY, f64::min);
        let max = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        info!(n_points = n, mean, min, max, "surface predicted");

        Ok(SurfaceSummary {
            n_points: n,
            mean_encounter_rate: mean,
            min_encounter_rate: min,
            max_encounter_rate: max,
            reference_effort: self.reference.clone(),
        })
    }
}
