//! End-to-end integration tests: CSV -> fit -> artifacts -> surface CSV.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use encounter_io::{ExperimentName, GridReader, ObservationReader, ResultWriter};
use encounter_model::{PipelineConfig, SurfacePredictor, TrainedModel};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

/// Write a synthetic survey CSV where detection follows `wetland`.
fn write_observations(path: &Path, n: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut csv = String::from(
        "checklist_id,latitude,longitude,detected,year,day_of_year,hours_of_day,duration_minutes,effort_distance_km,number_observers,wetland\n",
    );
    for i in 0..n {
        let wetland: f64 = rng.r#gen();
        let detected = rng.gen_bool(if wetland > 0.6 { 0.8 } else { 0.08 });
        let wetland_cell = if i % 53 == 0 {
            "NA".to_string()
        } else {
            format!("{wetland:.4}")
        };
        writeln!(
            csv,
            "C{i},{:.5},{:.5},{},{},{},{:.2},{:.0},{:.2},{},{wetland_cell}",
            rng.gen_range(44.0..46.0),
            rng.gen_range(-1.0..1.0),
            u8::from(detected),
            rng.gen_range(2018..=2020),
            rng.gen_range(1..=365),
            rng.gen_range(4.0..21.0),
            rng.gen_range(10.0..240.0),
            rng.gen_range(0.0..8.0),
            rng.gen_range(1..=5),
        )
        .unwrap();
    }
    fs::write(path, csv).unwrap();
}

fn write_grid(path: &Path) {
    let mut csv = String::from("id,latitude,longitude,wetland\n");
    for i in 0..25 {
        writeln!(csv, "g{i},{:.3},0.5,{:.3}", 44.0 + 0.08 * i as f64, i as f64 / 24.0).unwrap();
    }
    fs::write(path, csv).unwrap();
}

#[test]
fn fit_and_predict_round_trip() {
    let dir = TempDir::new().unwrap();
    let observations = dir.path().join("records.csv");
    let grid_path = dir.path().join("grid.csv");
    write_observations(&observations, 900);
    write_grid(&grid_path);

    // 1. Read and fit
    let set = ObservationReader::new(&observations).read().unwrap();
    assert_eq!(set.len(), 900);
    let out = PipelineConfig::new()
        .with_n_trees(30)
        .with_top_covariates(2)
        .run(&set)
        .unwrap();

    // 2. Persist artifacts
    let writer = ResultWriter::new(&dir.path().join("out"), ExperimentName::new("marsh").unwrap())
        .unwrap();
    out.model.save(writer.model_path()).unwrap();
    let assessment_path = writer
        .write_assessment(&out.assessment, out.n_train, out.n_test)
        .unwrap();
    let dependence_path = writer
        .write_dependence(&out.importance, &out.curves, out.peak.as_ref())
        .unwrap();

    let assessment: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&assessment_path).unwrap()).unwrap();
    assert_eq!(assessment["experiment"], "marsh");
    assert_eq!(assessment["models"].as_array().unwrap().len(), 2);
    assert_eq!(assessment["n_test"].as_u64().unwrap() as usize, out.n_test);

    let dependence: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&dependence_path).unwrap()).unwrap();
    assert_eq!(dependence["importance"][0]["name"], "wetland");
    assert_eq!(dependence["curves"].as_array().unwrap().len(), 2);
    assert!(dependence["peak_time"]["hours"].as_f64().is_some());

    // 3. Reload the model and predict a surface
    let model = TrainedModel::load(writer.model_path()).unwrap();
    let mut grid = GridReader::new(&grid_path).read().unwrap();
    let summary = SurfacePredictor::new(&model, model.reference_effort().clone())
        .apply(&mut grid)
        .unwrap();
    assert_eq!(summary.n_points, 25);
    let surface_path = writer.write_surface(&grid).unwrap();

    // 4. Read the surface back
    let mut rdr = csv::Reader::from_path(&surface_path).unwrap();
    let header: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header, ["id", "latitude", "longitude", "encounter_rate"]);
    let rates: Vec<f64> = rdr
        .records()
        .map(|r| r.unwrap()[3].parse().unwrap())
        .collect();
    assert_eq!(rates.len(), 25);
    assert!(rates.iter().all(|r| (0.0..=1.0).contains(r)));
    assert!(rates[24] > rates[0], "rates {rates:?}");
}
