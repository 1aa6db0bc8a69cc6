//! Configuration builder for ensemble training.

use crate::error::ForestError;
use crate::result::ForestFit;
use crate::split::SplitCriterion;

/// Strategy for the number of candidate covariates (`mtry`) at each split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// `round(sqrt(n_covariates))`, at least 1.
    Sqrt,
    /// A fraction of the covariates, rounded up (must be in (0.0, 1.0]).
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// Every covariate (plain bagging).
    All,
}

impl MaxFeatures {
    /// Resolve to a concrete count for `n_covariates` columns.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidMaxFeatures`] when the count falls
    /// outside `[1, n_covariates]`.
    pub fn resolve(self, n_covariates: usize) -> Result<usize, ForestError> {
        let resolved = match self {
            MaxFeatures::Sqrt => ((n_covariates as f64).sqrt().round() as usize).max(1),
            MaxFeatures::Fraction(f) => (n_covariates as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_covariates,
        };
        if resolved == 0 || resolved > n_covariates {
            return Err(ForestError::InvalidMaxFeatures {
                max_features: resolved,
                n_covariates,
            });
        }
        Ok(resolved)
    }
}

/// Whether to compute out-of-bag predictions during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Record which rows each tree left out and predict them with those trees.
    Enabled,
    /// Skip OOB bookkeeping.
    Disabled,
}

/// Configuration for ensemble training.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default    |
/// |---------------------|------------|
/// | `max_features`      | `Sqrt`     |
/// | `max_depth`         | `None`     |
/// | `min_samples_split` | 2          |
/// | `min_samples_leaf`  | 1          |
/// | `criterion`         | `Gini`     |
/// | `seed`              | 42         |
/// | `oob_mode`          | `Disabled` |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) seed: u64,
    pub(crate) oob_mode: OobMode,
}

impl ForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, ForestError> {
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: SplitCriterion::Gini,
            seed: 42,
            oob_mode: OobMode::Disabled,
        })
    }

    /// Set the candidate-covariate strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each child.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the master seed from which per-tree seeds are derived.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the OOB mode.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the candidate-covariate strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the OOB mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Train an ensemble.
    ///
    /// `rows[sample][covariate]` is row-major, `labels[sample]` is the
    /// detection flag, and `covariate_names` names every column in order.
    ///
    /// # Errors
    ///
    /// | Variant                                     | When                                         |
    /// |---------------------------------------------|----------------------------------------------|
    /// | [`ForestError::EmptyDataset`]               | `rows` is empty                              |
    /// | [`ForestError::ZeroCovariates`]             | rows have zero columns                       |
    /// | [`ForestError::CovariateCountMismatch`]     | rows have inconsistent lengths               |
    /// | [`ForestError::LabelCountMismatch`]         | `labels.len() != rows.len()`                 |
    /// | [`ForestError::CovariateNameCountMismatch`] | `covariate_names.len()` != column count      |
    /// | [`ForestError::NonFiniteValue`]             | any value is NaN or infinite                 |
    /// | [`ForestError::InvalidMaxFeatures`]         | `mtry` resolves outside [1, n_covariates]    |
    /// | [`ForestError::OobEvaluationFailed`]        | OOB enabled but no row was ever left out     |
    pub fn fit(
        &self,
        rows: &[Vec<f64>],
        labels: &[bool],
        covariate_names: &[String],
    ) -> Result<ForestFit, ForestError> {
        crate::forest::train(self, rows, labels, covariate_names)
    }
}
