//! Regression tests for encounter-forest probability quality.
//!
//! A deterministic synthetic detection dataset guards against algorithmic
//! changes that degrade the ensemble's probability estimates.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use encounter_forest::{ForestConfig, OobMode};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic detection dataset
// ---------------------------------------------------------------------------

/// 400 rows, 8 covariates. Detection probability is 0.9 when covariate 0
/// exceeds 0.5 and 0.1 otherwise; covariates 1-7 are uniform noise.
fn make_detections() -> (Vec<Vec<f64>>, Vec<bool>, Vec<String>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let n_samples = 400;
    let n_covariates = 8;

    let mut rows = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let row: Vec<f64> = (0..n_covariates).map(|_| rng.r#gen::<f64>()).collect();
        let p = if row[0] > 0.5 { 0.9 } else { 0.1 };
        labels.push(rng.r#gen::<f64>() < p);
        rows.push(row);
    }
    let names: Vec<String> = (0..n_covariates).map(|c| format!("c{c}")).collect();
    (rows, labels, names)
}

// ---------------------------------------------------------------------------
// a) oob_brier_below_threshold
// ---------------------------------------------------------------------------

/// OOB Brier score must stay well under the 0.25 of a constant 0.5 guess.
#[test]
fn oob_brier_below_threshold() {
    let (rows, labels, names) = make_detections();
    let fit = ForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .with_oob_mode(OobMode::Enabled)
        .fit(&rows, &labels, &names)
        .unwrap();
    let brier = fit.oob_predictions().unwrap().brier_score(&labels);
    assert!(brier < 0.18, "oob brier {brier} >= 0.18");
}

// ---------------------------------------------------------------------------
// b) informative_covariate_dominates
// ---------------------------------------------------------------------------

#[test]
fn informative_covariate_dominates() {
    let (rows, labels, names) = make_detections();
    let fit = ForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .fit(&rows, &labels, &names)
        .unwrap();
    let ranked = fit.ensemble().importance();
    assert_eq!(ranked[0].name, "c0");
    assert_eq!(ranked[0].rank, 1);
}

// ---------------------------------------------------------------------------
// c) probabilities_separate_regimes
// ---------------------------------------------------------------------------

/// Mean predicted probability in each regime lands near its true rate.
#[test]
fn probabilities_separate_regimes() {
    let (rows, labels, names) = make_detections();
    let ensemble = ForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .with_min_samples_leaf(5)
        .fit(&rows, &labels, &names)
        .unwrap()
        .into_ensemble();

    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let sample_near = |x0: f64, rng: &mut ChaCha8Rng| -> Vec<f64> {
        let mut row: Vec<f64> = (0..8).map(|_| rng.r#gen::<f64>()).collect();
        row[0] = x0;
        row
    };
    let low: Vec<Vec<f64>> = (0..50).map(|_| sample_near(0.2, &mut rng)).collect();
    let high: Vec<Vec<f64>> = (0..50).map(|_| sample_near(0.8, &mut rng)).collect();

    let mean = |v: Vec<f64>| v.iter().sum::<f64>() / v.len() as f64;
    let p_low = mean(ensemble.predict_batch(&low).unwrap());
    let p_high = mean(ensemble.predict_batch(&high).unwrap());
    assert!(p_low < 0.35, "low regime mean {p_low}");
    assert!(p_high > 0.65, "high regime mean {p_high}");
}

// ---------------------------------------------------------------------------
// d) reproducible_across_thread_counts
// ---------------------------------------------------------------------------

#[test]
fn reproducible_across_thread_counts() {
    let (rows, labels, names) = make_detections();
    let config = ForestConfig::new(30).unwrap().with_seed(5);

    let single = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| config.fit(&rows, &labels, &names).unwrap().into_ensemble());
    let multi = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
        .install(|| config.fit(&rows, &labels, &names).unwrap().into_ensemble());

    assert_eq!(
        single.predict_batch(&rows).unwrap(),
        multi.predict_batch(&rows).unwrap()
    );
}
