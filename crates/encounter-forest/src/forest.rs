//! Ensemble training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{ForestConfig, OobMode};
use crate::error::ForestError;
use crate::importance::total_decreases;
use crate::oob::compute_oob;
use crate::result::{ForestFit, TrainingMetadata};
use crate::tree::{DetectionTree, TreeConfig, to_columns};

/// A fitted ensemble of probability trees.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrainedEnsemble {
    pub(crate) trees: Vec<DetectionTree>,
    pub(crate) n_covariates: usize,
    pub(crate) covariate_names: Vec<String>,
    pub(crate) importance_totals: Vec<f64>,
}

/// Draw `n_samples` row indices with replacement and return them with the
/// indices that were never drawn.
fn bootstrap_sample(n_samples: usize, rng: &mut impl Rng) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Train the ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = rows.len()))]
pub(crate) fn train(
    config: &ForestConfig,
    rows: &[Vec<f64>],
    labels: &[bool],
    covariate_names: &[String],
) -> Result<ForestFit, ForestError> {
    let columns = to_columns(rows, labels)?;
    let n_samples = rows.len();
    let n_covariates = columns.len();
    if covariate_names.len() != n_covariates {
        return Err(ForestError::CovariateNameCountMismatch {
            n_names: covariate_names.len(),
            n_covariates,
        });
    }
    let mtry = config.max_features.resolve(n_covariates)?;
    let n_detected = labels.iter().filter(|&&y| y).count();

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_covariates,
        n_detected,
        mtry,
        "training ensemble"
    );

    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let tree_config = TreeConfig::new()
        .with_criterion(config.criterion)
        .with_max_depth(config.max_depth)
        .with_min_samples_split(config.min_samples_split)
        .with_min_samples_leaf(config.min_samples_leaf)
        .with_mtry(Some(mtry));

    // Indexed collect keeps tree order independent of scheduling.
    let grown: Vec<(DetectionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (bootstrap_indices, oob_indices) = bootstrap_sample(n_samples, &mut rng);
            let tree = tree_config
                .clone()
                .with_seed(rng.r#gen())
                .grow(&columns, labels, &bootstrap_indices)?;
            Ok::<_, ForestError>((tree, oob_indices))
        })
        .collect::<Result<_, _>>()?;

    let (trees, oob_indices_per_tree): (Vec<_>, Vec<_>) = grown.into_iter().unzip();

    debug!(n_trees_trained = trees.len(), "tree training complete");

    let per_tree: Vec<Vec<f64>> = trees.iter().map(DetectionTree::impurity_decreases).collect();
    let importance_totals = total_decreases(&per_tree, n_covariates);

    let oob = if config.oob_mode == OobMode::Enabled {
        Some(compute_oob(&trees, rows, &oob_indices_per_tree)?)
    } else {
        None
    };

    let ensemble = TrainedEnsemble {
        trees,
        n_covariates,
        covariate_names: covariate_names.to_vec(),
        importance_totals,
    };

    let metadata = TrainingMetadata {
        n_trees: config.n_trees,
        n_covariates,
        n_samples,
        n_detected,
        mtry,
    };

    info!(
        oob_brier = oob.as_ref().map(|o| o.brier_score(labels)),
        "ensemble training complete"
    );

    Ok(ForestFit::new(ensemble, oob, metadata))
}
