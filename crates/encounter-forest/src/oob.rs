//! Out-of-bag (OOB) probability estimates.

use crate::error::ForestError;
use crate::tree::DetectionTree;

/// Out-of-bag detection probabilities for the training rows.
#[derive(Debug, Clone)]
pub struct OobPredictions {
    /// Mean leaf detection rate over the trees that did not draw the row;
    /// `None` for rows drawn by every tree.
    pub probabilities: Vec<Option<f64>>,
    /// Number of rows with at least one OOB tree.
    pub n_oob_samples: usize,
}

impl OobPredictions {
    /// Brier score over the covered rows.
    #[must_use]
    pub fn brier_score(&self, labels: &[bool]) -> f64 {
        let (sum, n) = self
            .probabilities
            .iter()
            .zip(labels)
            .filter_map(|(p, &y)| p.map(|p| (p - f64::from(u8::from(y))).powi(2)))
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n == 0 { 0.0 } else { sum / n as f64 }
    }
}

/// Average leaf rates of each row's OOB trees, accumulated in tree order.
pub(crate) fn compute_oob(
    trees: &[DetectionTree],
    rows: &[Vec<f64>],
    oob_indices_per_tree: &[Vec<usize>],
) -> Result<OobPredictions, ForestError> {
    let n_samples = rows.len();
    let mut sums = vec![0.0f64; n_samples];
    let mut counts = vec![0usize; n_samples];

    for (tree, oob_indices) in trees.iter().zip(oob_indices_per_tree) {
        for &si in oob_indices {
            sums[si] += tree.leaf_rate(&rows[si]);
            counts[si] += 1;
        }
    }

    let n_oob_samples = counts.iter().filter(|&&c| c > 0).count();
    if n_oob_samples == 0 {
        return Err(ForestError::OobEvaluationFailed {
            reason: "no sample has any OOB tree".to_string(),
        });
    }

    let probabilities = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| (c > 0).then(|| s / c as f64))
        .collect();

    Ok(OobPredictions {
        probabilities,
        n_oob_samples,
    })
}
