/// Errors from ensemble training and inference.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds the covariate count.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_covariates}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of covariates in the dataset.
        n_covariates: usize,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero covariate columns.
    #[error("training dataset has zero covariate columns")]
    ZeroCovariates,

    /// Returned when a sample has a different number of covariates than expected.
    #[error("sample {sample_index} has {got} covariates, expected {expected}")]
    CovariateCountMismatch {
        /// The expected number of covariates.
        expected: usize,
        /// The actual number of covariates in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the label vector and the covariate rows differ in length.
    #[error("{n_labels} labels supplied for {n_samples} samples")]
    LabelCountMismatch {
        /// Number of covariate rows.
        n_samples: usize,
        /// Number of labels.
        n_labels: usize,
    },

    /// Returned when the covariate names do not match the column count.
    #[error("{n_names} covariate names supplied for {n_covariates} columns")]
    CovariateNameCountMismatch {
        /// Number of names supplied.
        n_names: usize,
        /// Number of covariate columns.
        n_covariates: usize,
    },

    /// Returned when a prediction row has a different width than the training data.
    #[error("prediction input has {got} covariates, expected {expected}")]
    PredictionCovariateMismatch {
        /// The expected number of covariates.
        expected: usize,
        /// The actual number of covariates in the prediction input.
        got: usize,
    },

    /// Returned when inference is attempted with a covariate schema that
    /// differs in names or order from the one used in training.
    #[error("covariate schema mismatch: model was trained on {expected:?}, got {got:?}")]
    SchemaMismatch {
        /// Covariate names the ensemble was trained on.
        expected: Vec<String>,
        /// Covariate names supplied at inference.
        got: Vec<String>,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, covariate {covariate_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending covariate column.
        covariate_index: usize,
    },

    /// Returned when OOB evaluation fails (no sample has any OOB tree).
    #[error("OOB evaluation failed: {reason}")]
    OobEvaluationFailed {
        /// Human-readable description of why OOB evaluation failed.
        reason: String,
    },
}

impl ForestError {
    /// Return `true` for errors caused by invalid parameters or a schema
    /// mismatch rather than by the data itself.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ForestError::InvalidTreeCount { .. }
                | ForestError::InvalidMaxDepth { .. }
                | ForestError::InvalidMinSamplesSplit { .. }
                | ForestError::InvalidMinSamplesLeaf { .. }
                | ForestError::InvalidMaxFeatures { .. }
                | ForestError::CovariateNameCountMismatch { .. }
                | ForestError::PredictionCovariateMismatch { .. }
                | ForestError::SchemaMismatch { .. }
        )
    }
}
