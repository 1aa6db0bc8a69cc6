use rand::Rng;

use crate::node::{CovariateIndex, Impurity};

/// Criterion for measuring the quality of a split on a binary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: `2p(1 - p)`
    Gini,
    /// Information entropy: `-p ln p - (1 - p) ln(1 - p)`
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node holding `n_detected` detections among
    /// `n_samples` samples.
    ///
    /// Returns zero for an empty node.
    #[must_use]
    pub fn impurity(&self, n_detected: usize, n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let p = n_detected as f64 / n_samples as f64;
        let q = 1.0 - p;
        let value = match self {
            SplitCriterion::Gini => 1.0 - p * p - q * q,
            SplitCriterion::Entropy => [p, q]
                .iter()
                .filter(|&&v| v > 0.0)
                .map(|&v| -v * v.ln())
                .sum(),
        };
        Impurity::new(value)
    }
}

/// Best split found for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) covariate: CovariateIndex,
    pub(crate) threshold: f64,
    /// Count-weighted impurity decrease, clamped at zero.
    pub(crate) impurity_decrease: f64,
    pub(crate) left_indices: Vec<usize>,
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best split among `mtry` randomly chosen covariates.
///
/// `columns` is column-major: `columns[covariate][sample]`. `sample_indices`
/// index into the inner vectors and may repeat (bootstrap draws).
///
/// Returns `None` when no candidate covariate separates the samples while
/// respecting `min_samples_leaf`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split(
    columns: &[Vec<f64>],
    labels: &[bool],
    sample_indices: &[usize],
    criterion: SplitCriterion,
    mtry: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_covariates = columns.len();
    let n_samples = sample_indices.len();
    if n_samples < 2 || n_covariates == 0 {
        return None;
    }

    let n_detected = sample_indices.iter().filter(|&&si| labels[si]).count();
    let parent_impurity = criterion.impurity(n_detected, n_samples).value();

    // Partial Fisher-Yates over covariate positions.
    let mut order: Vec<usize> = (0..n_covariates).collect();
    let take = mtry.min(n_covariates);
    for i in 0..take {
        let j = rng.gen_range(i..n_covariates);
        order.swap(i, j);
    }

    let mut best_decrease = f64::NEG_INFINITY;
    let mut best: Option<(usize, f64)> = None;
    let mut sorted: Vec<(f64, bool)> = Vec::with_capacity(n_samples);

    for &cov in &order[..take] {
        let column = &columns[cov];
        sorted.clear();
        sorted.extend(sample_indices.iter().map(|&si| (column[si], labels[si])));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_detected = 0usize;
        for i in 0..(n_samples - 1) {
            let (value, detected) = sorted[i];
            if detected {
                left_detected += 1;
            }
            let next = sorted[i + 1].0;
            if value == next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let left = criterion.impurity(left_detected, n_left).value();
            let right = criterion.impurity(n_detected - left_detected, n_right).value();
            let decrease = n_samples as f64 * parent_impurity
                - n_left as f64 * left
                - n_right as f64 * right;

            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((cov, midpoint(value, next)));
            }
        }
    }

    let (cov, threshold) = best?;
    let column = &columns[cov];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .partition(|&&si| column[si] <= threshold);

    Some(SplitResult {
        covariate: CovariateIndex::new(cov),
        threshold,
        impurity_decrease: best_decrease.max(0.0),
        left_indices,
        right_indices,
    })
}

/// Threshold between two distinct sorted values. Falls back to `value` when
/// the midpoint rounds up to `next`, so `next` always goes right.
fn midpoint(value: f64, next: f64) -> f64 {
    let mid = value + (next - value) / 2.0;
    if mid < next { mid } else { value }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{SplitCriterion, find_best_split, midpoint};

    #[test]
    fn gini_pure_and_balanced() {
        assert!(SplitCriterion::Gini.impurity(10, 10).value().abs() < f64::EPSILON);
        assert!(SplitCriterion::Gini.impurity(0, 10).value().abs() < f64::EPSILON);
        assert!((SplitCriterion::Gini.impurity(5, 10).value() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_balanced_is_ln2() {
        let imp = SplitCriterion::Entropy.impurity(5, 10);
        assert!((imp.value() - 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn separable_column_split_between_groups() {
        let columns = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let labels = vec![false, false, false, true, true, true];
        let indices: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = find_best_split(&columns, &labels, &indices, SplitCriterion::Gini, 1, 1, &mut rng)
            .expect("should find a split");
        assert_eq!(split.covariate.index(), 0);
        assert!(split.threshold > 3.0 && split.threshold < 10.0);
        assert_eq!(split.left_indices.len(), 3);
        assert_eq!(split.right_indices.len(), 3);
        // 6 * 0.5 - 0 - 0
        assert!((split.impurity_decrease - 3.0).abs() < 1e-12);
    }

    #[test]
    fn repeated_bootstrap_indices_are_partitioned_with_multiplicity() {
        let columns = vec![vec![1.0, 10.0]];
        let labels = vec![false, true];
        let indices = vec![0, 0, 1, 1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let split = find_best_split(&columns, &labels, &indices, SplitCriterion::Gini, 1, 1, &mut rng)
            .expect("should find a split");
        assert_eq!(split.left_indices, vec![0, 0]);
        assert_eq!(split.right_indices, vec![1, 1, 1]);
    }

    #[test]
    fn constant_column_returns_none() {
        let columns = vec![vec![5.0; 4]];
        let labels = vec![false, false, true, true];
        let indices: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(
            find_best_split(&columns, &labels, &indices, SplitCriterion::Gini, 1, 1, &mut rng)
                .is_none()
        );
    }

    #[test]
    fn min_samples_leaf_enforced() {
        let columns = vec![vec![1.0, 10.0]];
        let labels = vec![false, true];
        let indices = vec![0, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(
            find_best_split(&columns, &labels, &indices, SplitCriterion::Gini, 1, 2, &mut rng)
                .is_none()
        );
    }

    #[test]
    fn adjacent_float_values_still_separate() {
        let a = 1.0 + f64::EPSILON;
        let b = 1.0 + 2.0 * f64::EPSILON;
        assert_eq!(midpoint(a, b), a);

        let columns = vec![vec![a, b]];
        let labels = vec![false, true];
        let indices = vec![0, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let split = find_best_split(&columns, &labels, &indices, SplitCriterion::Gini, 1, 1, &mut rng)
            .expect("should find a split");
        assert_eq!(split.threshold, a);
        assert_eq!(split.left_indices, vec![0]);
        assert_eq!(split.right_indices, vec![1]);
    }
}
