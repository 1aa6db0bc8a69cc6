use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    ForestError,
    node::{Node, NodeIndex},
    split::{SplitCriterion, find_best_split},
};

/// Configuration for a single probability tree.
///
/// Construct via [`TreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default                 |
/// |---------------------|-------------------------|
/// | `criterion`         | `Gini`                  |
/// | `max_depth`         | `None` (unlimited)      |
/// | `min_samples_split` | 2                       |
/// | `min_samples_leaf`  | 1                       |
/// | `mtry`              | `None` (all covariates) |
/// | `seed`              | 42                      |
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) mtry: Option<usize>,
    pub(crate) seed: u64,
}

impl TreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            criterion: SplitCriterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            mtry: None,
            seed: 42,
        }
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the maximum tree depth (root is depth 0). `None` grows until
    /// leaves are pure or the sample-count limits stop growth.
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

    /// Set the number of candidate covariates drawn at each split.
    #[must_use]
    pub fn with_mtry(mut self, mtry: Option<usize>) -> Self {
        self.mtry = mtry;
        self
    }

    /// Set the random seed driving covariate subsets.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train a tree on a row-major dataset using every row once.
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                                   |
    /// |-----------------------------------------|----------------------------------------|
    /// | [`ForestError::EmptyDataset`]           | `rows` is empty                        |
    /// | [`ForestError::ZeroCovariates`]         | rows have zero columns                 |
    /// | [`ForestError::CovariateCountMismatch`] | rows have inconsistent lengths         |
    /// | [`ForestError::LabelCountMismatch`]     | `labels.len() != rows.len()`           |
    /// | [`ForestError::NonFiniteValue`]         | any value is NaN or infinite           |
    /// | parameter variants                      | see [`TreeConfig::grow`]               |
    pub fn fit(&self, rows: &[Vec<f64>], labels: &[bool]) -> Result<DetectionTree, ForestError> {
        let columns = to_columns(rows, labels)?;
        let sample_indices: Vec<usize> = (0..rows.len()).collect();
        self.grow(&columns, labels, &sample_indices)
    }

    /// Grow a tree from a `(sample_indices, mtry)` pair over pre-validated
    /// column-major data. `sample_indices` may contain repeats.
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                                        |
    /// |-----------------------------------------|---------------------------------------------|
    /// | [`ForestError::EmptyDataset`]           | `sample_indices` is empty                   |
    /// | [`ForestError::ZeroCovariates`]         | `columns` is empty                          |
    /// | [`ForestError::InvalidMaxFeatures`]     | `mtry` resolves outside [1, n_covariates]   |
    /// | [`ForestError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`                    |
    /// | [`ForestError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                     |
    /// | [`ForestError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                      |
    #[instrument(level = "trace", skip_all, fields(n_samples = sample_indices.len()))]
    pub fn grow(
        &self,
        columns: &[Vec<f64>],
        labels: &[bool],
        sample_indices: &[usize],
    ) -> Result<DetectionTree, ForestError> {
        if sample_indices.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let n_covariates = columns.len();
        if n_covariates == 0 {
            return Err(ForestError::ZeroCovariates);
        }
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(ForestError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(ForestError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        let mtry = self.mtry.unwrap_or(n_covariates);
        if mtry == 0 || mtry > n_covariates {
            return Err(ForestError::InvalidMaxFeatures {
                max_features: mtry,
                n_covariates,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut arena: Vec<Node> = Vec::new();
        let mut grower = Grower {
            columns,
            labels,
            config: self,
            mtry,
            rng: &mut rng,
            arena: &mut arena,
        };
        grower.build(sample_indices, 0);

        debug!(n_nodes = arena.len(), "tree grown");

        Ok(DetectionTree {
            nodes: arena,
            n_covariates,
        })
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate row-major data and transpose it to column-major layout.
pub(crate) fn to_columns(rows: &[Vec<f64>], labels: &[bool]) -> Result<Vec<Vec<f64>>, ForestError> {
    if rows.is_empty() {
        return Err(ForestError::EmptyDataset);
    }
    if labels.len() != rows.len() {
        return Err(ForestError::LabelCountMismatch {
            n_samples: rows.len(),
            n_labels: labels.len(),
        });
    }
    let n_covariates = rows[0].len();
    if n_covariates == 0 {
        return Err(ForestError::ZeroCovariates);
    }
    for (sample_index, row) in rows.iter().enumerate() {
        if row.len() != n_covariates {
            return Err(ForestError::CovariateCountMismatch {
                expected: n_covariates,
                got: row.len(),
                sample_index,
            });
        }
        if let Some(covariate_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(ForestError::NonFiniteValue {
                sample_index,
                covariate_index,
            });
        }
    }
    Ok((0..n_covariates)
        .map(|c| rows.iter().map(|row| row[c]).collect())
        .collect())
}

/// Recursive arena builder for one tree.
struct Grower<'a> {
    columns: &'a [Vec<f64>],
    labels: &'a [bool],
    config: &'a TreeConfig,
    mtry: usize,
    rng: &'a mut ChaCha8Rng,
    arena: &'a mut Vec<Node>,
}

impl Grower<'_> {
    fn build(&mut self, sample_indices: &[usize], depth: usize) -> NodeIndex {
        let n_samples = sample_indices.len();
        let n_detected = sample_indices.iter().filter(|&&si| self.labels[si]).count();
        let impurity = self.config.criterion.impurity(n_detected, n_samples);

        let depth_exceeded = self.config.max_depth.is_some_and(|d| depth >= d);
        let too_few = n_samples < self.config.min_samples_split;
        let pure = impurity.value() == 0.0;

        let split = if too_few || pure || depth_exceeded {
            None
        } else {
            find_best_split(
                self.columns,
                self.labels,
                sample_indices,
                self.config.criterion,
                self.mtry,
                self.config.min_samples_leaf,
                &mut *self.rng,
            )
        };

        let Some(split) = split else {
            let idx = self.arena.len();
            self.arena.push(Node::Leaf {
                detection_rate: n_detected as f64 / n_samples as f64,
                impurity,
                n_samples,
            });
            return NodeIndex::new(idx);
        };

        // Reserve the slot so children get higher indices; overwritten below.
        let node_idx = self.arena.len();
        self.arena.push(Node::Leaf {
            detection_rate: 0.0,
            impurity,
            n_samples,
        });

        let left = self.build(&split.left_indices, depth + 1);
        let right = self.build(&split.right_indices, depth + 1);

        self.arena[node_idx] = Node::Split {
            covariate: split.covariate,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };
        NodeIndex::new(node_idx)
    }
}

/// A fitted probability tree stored as a node arena rooted at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DetectionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_covariates: usize,
}

impl DetectionTree {
    /// Return the detection fraction of the leaf `row` falls into.
    ///
    /// At each split the row goes left when `row[covariate] <= threshold`.
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
        Ok(self.leaf_rate(row))
    }

    /// Leaf lookup without the width check; callers validate once per row.
    pub(crate) fn leaf_rate(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { detection_rate, .. } => return *detection_rate,
                Node::Split {
                    covariate,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[covariate.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Total impurity decrease per covariate over every split in the tree.
    #[must_use]
    pub fn impurity_decreases(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_covariates];
        for node in &self.nodes {
            if let Node::Split {
                covariate,
                impurity_decrease,
                ..
            } = node
            {
                totals[covariate.index()] += impurity_decrease;
            }
        }
        totals
    }

    /// Return the arena nodes.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the total number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth; a single root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<bool>) {
        let rows = vec![
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
            vec![10.0, 0.0],
            vec![11.0, 0.0],
            vec![12.0, 0.0],
        ];
        let labels = vec![false, false, false, true, true, true];
        (rows, labels)
    }

    #[test]
    fn empty_dataset_error() {
        let err = TreeConfig::new().fit(&[], &[]).unwrap_err();
        assert!(matches!(err, ForestError::EmptyDataset));
    }

    #[test]
    fn constant_label_single_leaf() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let tree = TreeConfig::new().fit(&rows, &[true, true, true]).unwrap();
        assert_eq!(tree.n_nodes(), 1);
        assert!((tree.predict_proba(&[0.0, 0.0]).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn linearly_separable_correct_leaves() {
        let (rows, labels) = separable();
        let tree = TreeConfig::new().with_seed(42).fit(&rows, &labels).unwrap();
        assert!(tree.predict_proba(&[2.0, 0.0]).unwrap() < 0.5);
        assert!(tree.predict_proba(&[11.0, 0.0]).unwrap() > 0.5);
        // Column 1 is constant and never chosen.
        let decreases = tree.impurity_decreases();
        assert!(decreases[0] > 0.0);
        assert_eq!(decreases[1], 0.0);
    }

    #[test]
    fn adjacent_float_covariate_grows_one_split() {
        let a = 1.0 + f64::EPSILON;
        let b = 1.0 + 2.0 * f64::EPSILON;
        let tree = TreeConfig::new().fit(&[vec![a], vec![b]], &[false, true]).unwrap();
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.depth(), 1);
        assert!(tree.predict_proba(&[a]).unwrap() < 0.5);
        assert!(tree.predict_proba(&[b]).unwrap() > 0.5);
    }

    #[test]
    fn xor_needs_depth_at_least_2() {
        let rows = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let labels = vec![false, true, true, false];
        let tree = TreeConfig::new().with_seed(42).fit(&rows, &labels).unwrap();
        assert!(tree.depth() >= 2);
    }

    #[test]
    fn max_depth_limits_tree() {
        let rows = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let labels = vec![false, true, true, false];
        let tree = TreeConfig::new()
            .with_max_depth(Some(1))
            .fit(&rows, &labels)
            .unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn grow_respects_bootstrap_multiplicity() {
        let (rows, labels) = separable();
        let columns = to_columns(&rows, &labels).unwrap();
        // Only detections drawn: the tree is a single pure leaf.
        let tree = TreeConfig::new().grow(&columns, &labels, &[3, 3, 4, 5]).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert!((tree.predict_proba(&[0.0, 0.0]).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn prediction_width_mismatch() {
        let (rows, labels) = separable();
        let tree = TreeConfig::new().fit(&rows, &labels).unwrap();
        let err = tree.predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            ForestError::PredictionCovariateMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn label_count_mismatch_error() {
        let (rows, _) = separable();
        let err = TreeConfig::new().fit(&rows, &[true]).unwrap_err();
        assert!(matches!(err, ForestError::LabelCountMismatch { n_samples: 6, n_labels: 1 }));
    }

    #[test]
    fn non_finite_value_error() {
        let rows = vec![vec![1.0, f64::NAN], vec![3.0, 4.0]];
        let err = TreeConfig::new().fit(&rows, &[false, true]).unwrap_err();
        assert!(matches!(
            err,
            ForestError::NonFiniteValue { sample_index: 0, covariate_index: 1 }
        ));
    }

    #[test]
    fn invalid_min_samples_leaf() {
        let (rows, labels) = separable();
        let err = TreeConfig::new()
            .with_min_samples_leaf(0)
            .fit(&rows, &labels)
            .unwrap_err();
        assert!(matches!(err, ForestError::InvalidMinSamplesLeaf { .. }));
    }
}
