//! End-to-end pipeline tests on a synthetic survey.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use encounter_model::{
    Assessor, ErrorKind, ModelError, PipelineConfig, PredictionGrid, PredictionGridPoint,
    SurfacePredictor, TrainedModel,
};
use encounter_survey::{
    ChecklistId, CovariateSchema, DAY_OF_YEAR, DURATION_MINUTES, EFFORT_DISTANCE_KM, GeoPoint,
    HOURS_OF_DAY, NUMBER_OBSERVERS, Observation, ObservationSet, SurveyDate, YEAR,
};

const FOREST_COVER: &str = "forest_cover";

// ---------------------------------------------------------------------------
// Helper: synthetic survey
// ---------------------------------------------------------------------------

/// Records scattered over two degrees of latitude and longitude across three
/// years. Detection probability is 0.85 where forest cover exceeds 0.5 and
/// 0.05 elsewhere; effort covariates are noise. Every 97th record is missing
/// its forest cover.
fn make_survey(n: usize) -> ObservationSet {
    let schema = CovariateSchema::new(
        [
            HOURS_OF_DAY,
            DURATION_MINUTES,
            EFFORT_DISTANCE_KM,
            NUMBER_OBSERVERS,
            YEAR,
            DAY_OF_YEAR,
            FOREST_COVER,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let observations = (0..n)
        .map(|i| {
            let year = rng.gen_range(2019..=2021);
            let doy: u16 = rng.gen_range(1..=365);
            let cover: f64 = rng.r#gen();
            let detected = rng.gen_bool(if cover > 0.5 { 0.85 } else { 0.05 });
            let covariates = vec![
                Some(rng.gen_range(5.0..20.0)),
                Some(rng.gen_range(5.0..180.0)),
                Some(rng.gen_range(0.0..5.0)),
                Some(f64::from(rng.gen_range(1u8..=4))),
                Some(f64::from(year)),
                Some(f64::from(doy)),
                if i % 97 == 0 { None } else { Some(cover) },
            ];
            Observation {
                id: ChecklistId::new(format!("S{i}")),
                location: GeoPoint::new(rng.gen_range(40.0..42.0), rng.gen_range(-76.0..-74.0))
                    .unwrap(),
                date: SurveyDate::new(year, doy).unwrap(),
                covariates,
                detected,
            }
        })
        .collect();
    ObservationSet::new(schema, observations).unwrap()
}

fn small_config() -> PipelineConfig {
    PipelineConfig::new().with_n_trees(40).with_top_covariates(3)
}

// ---------------------------------------------------------------------------
// a) full_run_produces_consistent_output
// ---------------------------------------------------------------------------

#[test]
fn full_run_produces_consistent_output() {
    let set = make_survey(1200);
    let out = small_config().run(&set).unwrap();

    assert_eq!(out.subsample.n_input, 1200);
    assert_eq!(out.n_train + out.n_test + out.n_dropped, out.subsample.n_strata);
    assert_eq!(out.test.len(), out.n_test);
    assert_eq!(out.model.ensemble().n_trees(), 40);

    assert_eq!(out.importance[0].name, FOREST_COVER);
    assert_eq!(out.curves.len(), 3);
    assert_eq!(out.curves[0].covariate, FOREST_COVER);
    assert!(out.assessment.calibrated.auc > 0.75, "auc {}", out.assessment.calibrated.auc);
    assert!(out.assessment.raw.auc > 0.75, "auc {}", out.assessment.raw.auc);

    let peak = out.peak.expect("model has a time-of-day covariate");
    assert!((5.0..20.0).contains(&peak.hours), "peak at {}", peak.hours);
    let reference = out.model.reference_effort();
    assert_eq!(reference.get(HOURS_OF_DAY), Some(peak.hours));
    assert_eq!(reference.get(YEAR), Some(2021.0));
    assert_eq!(reference.get(FOREST_COVER), None);
    assert_eq!(reference.len(), 6);
}

// ---------------------------------------------------------------------------
// b) same_seed_same_result
// ---------------------------------------------------------------------------

#[test]
fn same_seed_same_result() {
    let set = make_survey(600);
    let a = small_config().with_seed(7).run(&set).unwrap();
    let b = small_config().with_seed(7).run(&set).unwrap();
    assert_eq!(a.assessment, b.assessment);
    assert_eq!(a.importance, b.importance);
    assert_eq!(a.curves, b.curves);
    assert_eq!(a.model.calibration(), b.model.calibration());
}

// ---------------------------------------------------------------------------
// c) saved_model_reproduces_assessment
// ---------------------------------------------------------------------------

#[test]
fn saved_model_reproduces_assessment() {
    let set = make_survey(800);
    let out = small_config().run(&set).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.bin");
    out.model.save(&path).unwrap();
    let loaded = TrainedModel::load(&path).unwrap();

    let report = loaded.assess(&out.test, &Assessor::new()).unwrap();
    assert_eq!(report, out.assessment);
}

// ---------------------------------------------------------------------------
// d) surface_prediction_from_loaded_model
// ---------------------------------------------------------------------------

#[test]
fn surface_prediction_from_loaded_model() {
    let set = make_survey(800);
    let out = small_config().run(&set).unwrap();

    let points = (0..10)
        .map(|i| {
            PredictionGridPoint::new(
                format!("cell-{i}"),
                GeoPoint::new(41.0, -75.0 + 0.01 * i as f64).unwrap(),
                vec![i as f64 / 9.0],
            )
        })
        .collect();
    let mut grid = PredictionGrid::new(vec![FOREST_COVER.to_string()], points).unwrap();
    let summary = SurfacePredictor::new(&out.model, out.model.reference_effort().clone())
        .apply(&mut grid)
        .unwrap();

    assert_eq!(summary.n_points, 10);
    let rates: Vec<f64> = grid.points().iter().map(|p| p.encounter_rate().unwrap()).collect();
    assert!(rates.iter().all(|r| (0.0..=1.0).contains(r)));
    assert!(rates[9] > rates[0], "rates {rates:?}");
}

// ---------------------------------------------------------------------------
// e) failures
// ---------------------------------------------------------------------------

#[test]
fn single_record_leaves_a_partition_empty() {
    let set = make_survey(1);
    let obs = set.observations()[0].clone();
    let complete = Observation {
        covariates: obs.covariates.iter().map(|c| c.or(Some(0.3))).collect(),
        ..obs
    };
    let set = ObservationSet::new(set.schema().clone(), vec![complete]).unwrap();
    let err = small_config().run(&set).unwrap_err();
    assert!(matches!(err, ModelError::EmptyPartition { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::DataQuality);
}

#[test]
fn invalid_settings_are_configuration_errors() {
    let set = make_survey(50);
    let err = small_config().with_spacing_km(0.0).run(&set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = small_config().with_train_fraction(1.0).run(&set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
