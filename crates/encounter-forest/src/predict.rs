//! Prediction methods for the trained ensemble.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::ForestError;
use crate::forest::TrainedEnsemble;
use crate::importance::{RankedCovariate, rank_importances};

impl TrainedEnsemble {
    /// Return the encounter probability for one row: the mean of the
    /// per-tree leaf detection rates, summed in tree order.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionCovariateMismatch`] when
    /// `row.len() != n_covariates`.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ForestError> {
        if row.len() != self.n_covariates {
            return Err(ForestError::PredictionCovariateMismatch {
                expected: self.n_covariates,
                got: row.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.leaf_rate(row)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    /// Predict a batch of rows in parallel. Output order matches input order.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionCovariateMismatch`] if any row has
    /// the wrong width.
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ForestError> {
        rows.into_par_iter()
            .map(|row| self.predict_proba(row))
            .collect()
    }

    /// Check that `names` equals the training schema in content and order.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::SchemaMismatch`] on any difference.
    pub fn check_covariates(&self, names: &[String]) -> Result<(), ForestError> {
        if names != self.covariate_names.as_slice() {
            return Err(ForestError::SchemaMismatch {
                expected: self.covariate_names.clone(),
                got: names.to_vec(),
            });
        }
        Ok(())
    }

    /// Covariates ranked by total impurity decrease, highest first.
    #[must_use]
    pub fn importance(&self) -> Vec<RankedCovariate> {
        rank_importances(&self.importance_totals, &self.covariate_names)
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of covariates the ensemble was trained on.
    #[must_use]
    pub fn n_covariates(&self) -> usize {
        self.n_covariates
    }

    /// Return the covariate names in training order.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }
}
