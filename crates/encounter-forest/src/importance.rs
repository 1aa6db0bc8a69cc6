//! Impurity-based covariate importance.

/// A covariate ranked by its total impurity decrease.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RankedCovariate {
    /// Covariate name.
    pub name: String,
    /// Total count-weighted impurity decrease over all trees and splits.
    pub importance: f64,
    /// `importance` divided by the sum over all covariates (0 when nothing split).
    pub share: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Sum per-tree decreases into one total per covariate.
pub(crate) fn total_decreases(per_tree: &[Vec<f64>], n_covariates: usize) -> Vec<f64> {
    let mut totals = vec![0.0f64; n_covariates];
    for tree in per_tree {
        for (total, value) in totals.iter_mut().zip(tree) {
            *total += value;
        }
    }
    totals
}

/// Rank covariates by descending importance. Ties keep schema order.
pub(crate) fn rank_importances(totals: &[f64], names: &[String]) -> Vec<RankedCovariate> {
    let sum: f64 = totals.iter().sum();
    let mut ranked: Vec<RankedCovariate> = names
        .iter()
        .zip(totals)
        .map(|(name, &importance)| RankedCovariate {
            name: name.clone(),
            importance,
            share: if sum > 0.0 { importance / sum } else { 0.0 },
            rank: 0,
        })
        .collect();

    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, covariate) in ranked.iter_mut().enumerate() {
        covariate.rank = i + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_across_trees() {
        let totals = total_decreases(&[vec![1.0, 0.0, 2.0], vec![0.5, 0.0, 1.0]], 3);
        assert_eq!(totals, vec![1.5, 0.0, 3.0]);
    }

    #[test]
    fn ranking_is_descending_with_shares() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ranked = rank_importances(&[1.0, 0.0, 3.0], &names);
        assert_eq!(ranked[0].name, "c");
        assert_eq!(ranked[0].rank, 1);
        assert!((ranked[0].share - 0.75).abs() < 1e-12);
        assert_eq!(ranked[2].name, "b");
        assert_eq!(ranked[2].share, 0.0);
    }

    #[test]
    fn all_zero_gives_zero_shares() {
        let names = vec!["a".to_string(), "b".to_string()];
        let ranked = rank_importances(&[0.0, 0.0], &names);
        assert!(ranked.iter().all(|r| r.share == 0.0));
        assert_eq!(ranked[0].name, "a");
    }
}
