//! JSON and CSV result writer for fitted models and surfaces.

use std::fs;
use std::path::{Path, PathBuf};

use encounter_forest::RankedCovariate;
use encounter_model::{
    AssessmentReport, DependenceCurve, ModelAssessment, ModelVariant, PeakTime, PredictionGrid,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Writes pipeline results under one experiment name.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are `{experiment}_model.bin`, `{experiment}_assessment.json`,
/// `{experiment}_dependence.json`, and `{experiment}_surface.csv`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    fn path_for(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}", self.experiment.as_str()))
    }

    /// Path of the model artifact, `{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.path_for("model.bin")
    }

    fn write_json<T: Serialize>(&self, path: &Path, artifact: &T) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeJson {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write raw and calibrated metrics to `{experiment}_assessment.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_assessment(
        &self,
        report: &AssessmentReport,
        n_train: usize,
        n_test: usize,
    ) -> Result<PathBuf, IoError> {
        let path = self.path_for("assessment.json");
        let models = [ModelVariant::Raw, ModelVariant::Calibrated]
            .into_iter()
            .map(|variant| AssessmentEntry {
                model: variant,
                metrics: report.variant(variant),
            })
            .collect();
        let artifact = AssessmentArtifact {
            experiment: self.experiment.as_str(),
            n_train,
            n_test,
            models,
        };
        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "assessment written");
        Ok(path)
    }

    /// Write importance, dependence curves, and the peak time of day to
    /// `{experiment}_dependence.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(n_curves = curves.len()))]
    pub fn write_dependence(
        &self,
        importance: &[RankedCovariate],
        curves: &[DependenceCurve],
        peak_time: Option<&PeakTime>,
    ) -> Result<PathBuf, IoError> {
        let path = self.path_for("dependence.json");
        let artifact = DependenceArtifact {
            experiment: self.experiment.as_str(),
            importance,
            curves,
            peak_time,
        };
        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "dependence written");
        Ok(path)
    }

    /// Write `id,latitude,longitude,encounter_rate` rows to
    /// `{experiment}_surface.csv`. Points without a rate get an empty cell.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if the file cannot be written.
    #[instrument(skip_all, fields(n_points = grid.len()))]
    pub fn write_surface(&self, grid: &PredictionGrid) -> Result<PathBuf, IoError> {
        let path = self.path_for("surface.csv");
        let csv_error = |e: csv::Error| IoError::CsvWrite {
            path: path.clone(),
            source: e,
        };
        let mut wtr = csv::Writer::from_path(&path).map_err(csv_error)?;
        for point in grid.points() {
            wtr.serialize(SurfaceRow {
                id: &point.id,
                latitude: point.location.latitude,
                longitude: point.location.longitude,
                encounter_rate: point.encounter_rate(),
            })
            .map_err(csv_error)?;
        }
        wtr.flush().map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "surface written");
        Ok(path)
    }
}

#[derive(Serialize)]
struct AssessmentArtifact<'a> {
    experiment: &'a str,
    n_train: usize,
    n_test: usize,
    models: Vec<AssessmentEntry<'a>>,
}

#[derive(Serialize)]
struct AssessmentEntry<'a> {
    model: ModelVariant,
    #[serde(flatten)]
    metrics: &'a ModelAssessment,
}

#[derive(Serialize)]
struct DependenceArtifact<'a> {
    experiment: &'a str,
    importance: &'a [RankedCovariate],
    curves: &'a [DependenceCurve],
    peak_time: Option<&'a PeakTime>,
}

#[derive(Serialize)]
struct SurfaceRow<'a> {
    id: &'a str,
    latitude: f64,
    longitude: f64,
    encounter_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use encounter_model::{DependencePoint, PredictionGridPoint};
    use encounter_survey::GeoPoint;
    use tempfile::TempDir;

    fn writer(dir: &TempDir) -> ResultWriter {
        ResultWriter::new(dir.path(), ExperimentName::new("exp").unwrap()).unwrap()
    }

    fn assessment(threshold: f64) -> ModelAssessment {
        ModelAssessment {
            threshold,
            mse: 0.1,
            sensitivity: 0.8,
            specificity: 0.7,
            auc: 0.85,
            kappa: 0.5,
            n: 100,
            n_detected: 30,
        }
    }

    #[test]
    fn creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let w = ResultWriter::new(&nested, ExperimentName::new("x").unwrap()).unwrap();
        assert!(nested.is_dir());
        assert_eq!(w.model_path(), nested.join("x_model.bin"));
    }

    #[test]
    fn assessment_json_lists_both_models() {
        let dir = TempDir::new().unwrap();
        let report = AssessmentReport {
            raw: assessment(0.3),
            calibrated: assessment(0.4),
        };
        let path = writer(&dir).write_assessment(&report, 400, 100).unwrap();
        assert_eq!(path.file_name().unwrap(), "exp_assessment.json");

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["experiment"], "exp");
        assert_eq!(json["n_train"], 400);
        assert_eq!(json["models"][0]["model"], "raw");
        assert_eq!(json["models"][1]["model"], "calibrated");
        assert_eq!(json["models"][1]["threshold"], 0.4);
        assert_eq!(json["models"][0]["auc"], 0.85);
    }

    #[test]
    fn dependence_json_contents() {
        let dir = TempDir::new().unwrap();
        let importance = vec![RankedCovariate {
            name: "forest".into(),
            importance: 12.0,
            share: 1.0,
            rank: 1,
        }];
        let curves = vec![DependenceCurve {
            covariate: "forest".into(),
            points: vec![
                DependencePoint {
                    value: 0.0,
                    mean_probability: 0.1,
                },
                DependencePoint {
                    value: 1.0,
                    mean_probability: 0.6,
                },
            ],
        }];
        let peak = PeakTime {
            hours: 6.5,
            encounter_rate: 0.4,
            hour_share: 0.1,
        };
        let path = writer(&dir)
            .write_dependence(&importance, &curves, Some(&peak))
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["importance"][0]["name"], "forest");
        assert_eq!(json["curves"][0]["points"][1]["mean_probability"], 0.6);
        assert_eq!(json["peak_time"]["hours"], 6.5);

        let path = writer(&dir).write_dependence(&importance, &curves, None).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["peak_time"].is_null());
    }

    #[test]
    fn surface_csv_rows() {
        let dir = TempDir::new().unwrap();
        let grid = PredictionGrid::new(
            vec!["forest".into()],
            vec![PredictionGridPoint::new("c1", GeoPoint::new(41.0, -75.5).unwrap(), vec![0.2])],
        )
        .unwrap();
        let path = writer(&dir).write_surface(&grid).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,latitude,longitude,encounter_rate"));
        assert_eq!(lines.next(), Some("c1,41.0,-75.5,"));
    }
}
