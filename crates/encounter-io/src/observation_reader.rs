//! CSV survey record reader with full input validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use encounter_survey::{
    ChecklistId, CovariateSchema, DAY_OF_YEAR, GeoPoint, Observation, ObservationSet, SurveyDate,
    YEAR,
};
use tracing::{debug, info, instrument, warn};

use crate::IoError;
use crate::domain::is_missing;

const CHECKLIST_ID: &str = "checklist_id";
const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";
const DETECTED: &str = "detected";

/// Reads survey records from a CSV file.
///
/// Expected CSV format:
/// - Header row required, columns in any order
/// - Required: `checklist_id`, `latitude`, `longitude`, `detected`, `year`, `day_of_year`
/// - Every other column, plus `year` and `day_of_year`, is a covariate in header order
/// - Empty or `NA` covariate cells are missing values
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | A required column is absent |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Covariate is NaN, Inf, or unparseable |
/// | [`IoError::InvalidDetected`] | Detection flag is not `true/false/1/0` |
/// | [`IoError::InvalidDate`] | Year or day of year missing or not an integer |
/// | [`IoError::InvalidRecord`] | Coordinates or day of year out of range |
/// | [`IoError::DuplicateId`] | Same `checklist_id` appears twice |
/// | [`IoError::Survey`] | Duplicate covariate column names |
pub struct ObservationReader {
    path: PathBuf,
}

/// Header positions of the required columns.
struct Columns {
    id: usize,
    latitude: usize,
    longitude: usize,
    detected: usize,
    year: usize,
    day_of_year: usize,
}

impl ObservationReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    fn column(&self, header: &csv::StringRecord, name: &'static str) -> Result<usize, IoError> {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| IoError::MissingColumn {
                path: self.path.clone(),
                column: name,
            })
    }

    /// Read and validate the CSV file, returning an [`ObservationSet`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<ObservationSet, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of CsvParse.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        let columns = Columns {
            id: self.column(&header, CHECKLIST_ID)?,
            latitude: self.column(&header, LATITUDE)?,
            longitude: self.column(&header, LONGITUDE)?,
            detected: self.column(&header, DETECTED)?,
            year: self.column(&header, YEAR)?,
            day_of_year: self.column(&header, DAY_OF_YEAR)?,
        };
        let fixed = [columns.id, columns.latitude, columns.longitude, columns.detected];
        let covariate_columns: Vec<usize> = (0..header.len()).filter(|i| !fixed.contains(i)).collect();
        let names: Vec<String> = covariate_columns
            .iter()
            .map(|&i| header[i].trim().to_string())
            .collect();
        debug!(n_covariates = names.len(), "read CSV header");
        let schema = CovariateSchema::new(names)?;

        let mut observations = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut n_missing = 0usize;

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            let id = record.get(columns.id).unwrap_or("").trim().to_string();

            if record.len() != header.len() {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    id,
                    expected: header.len(),
                    got: record.len(),
                });
            }

            if let Some(&first_row) = seen.get(&id) {
                return Err(IoError::DuplicateId {
                    path: self.path.clone(),
                    id,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(id.clone(), row_index);

            let latitude = self.finite(&record, &header, columns.latitude, row_index)?;
            let longitude = self.finite(&record, &header, columns.longitude, row_index)?;
            let location = GeoPoint::new(latitude, longitude).map_err(|e| IoError::InvalidRecord {
                path: self.path.clone(),
                row_index,
                source: e,
            })?;

            let year = self.integer(&record, columns.year, YEAR, row_index)?;
            let day_of_year = self.integer(&record, columns.day_of_year, DAY_OF_YEAR, row_index)?;
            let date = i32::try_from(year)
                .ok()
                .zip(u16::try_from(day_of_year).ok())
                .ok_or_else(|| IoError::InvalidDate {
                    path: self.path.clone(),
                    row_index,
                    column: DAY_OF_YEAR,
                    raw: format!("{year}/{day_of_year}"),
                })
                .and_then(|(y, d)| {
                    SurveyDate::new(y, d).map_err(|e| IoError::InvalidRecord {
                        path: self.path.clone(),
                        row_index,
                        source: e,
                    })
                })?;

            let raw_detected = record.get(columns.detected).unwrap_or("").trim();
            let detected = parse_detected(raw_detected).ok_or_else(|| IoError::InvalidDetected {
                path: self.path.clone(),
                row_index,
                raw: raw_detected.to_string(),
            })?;

            let mut covariates = Vec::with_capacity(covariate_columns.len());
            for &col in &covariate_columns {
                let raw = record.get(col).unwrap_or("");
                if is_missing(raw) {
                    n_missing += 1;
                    covariates.push(None);
                } else {
                    covariates.push(Some(self.finite(&record, &header, col, row_index)?));
                }
            }

            observations.push(Observation {
                id: ChecklistId::new(id),
                location,
                date,
                covariates,
                detected,
            });
        }

        if observations.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }
        if n_missing > 0 {
            warn!(n_missing, "missing covariate cells");
        }

        let set = ObservationSet::new(schema, observations)?;
        info!(
            n_observations = set.len(),
            n_covariates = set.schema().len(),
            prevalence = set.prevalence(),
            "observations loaded"
        );
        Ok(set)
    }

    fn finite(
        &self,
        record: &csv::StringRecord,
        header: &csv::StringRecord,
        col: usize,
        row_index: usize,
    ) -> Result<f64, IoError> {
        let raw = record.get(col).unwrap_or("");
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| IoError::NonFiniteValue {
                path: self.path.clone(),
                row_index,
                column: header.get(col).unwrap_or("").trim().to_string(),
                raw: raw.to_string(),
            })
    }

    fn integer(
        &self,
        record: &csv::StringRecord,
        col: usize,
        column: &'static str,
        row_index: usize,
    ) -> Result<i64, IoError> {
        let raw = record.get(col).unwrap_or("");
        raw.trim().parse::<i64>().map_err(|_| IoError::InvalidDate {
            path: self.path.clone(),
            row_index,
            column,
            raw: raw.to_string(),
        })
    }
}

fn parse_detected(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") || raw == "1" {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") || raw == "0" {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const HEADER: &str = "checklist_id,latitude,longitude,detected,year,day_of_year,hours_of_day,forest";

    fn read(body: &str) -> Result<ObservationSet, IoError> {
        let f = write_csv(&format!("{HEADER}\n{body}"));
        ObservationReader::new(f.path()).read()
    }

    #[test]
    fn read_valid_records() {
        let set = read("S1,40.1,-75.2,true,2020,150,6.5,0.3\nS2,40.2,-75.1,0,2021,10,NA,\n").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.schema().names(),
            &["year", "day_of_year", "hours_of_day", "forest"]
        );
        let first = &set.observations()[0];
        assert_eq!(first.id.as_str(), "S1");
        assert!(first.detected);
        assert_eq!(first.date.day_of_year(), 150);
        assert_eq!(first.covariates, vec![Some(2020.0), Some(150.0), Some(6.5), Some(0.3)]);
        let second = &set.observations()[1];
        assert!(!second.detected);
        assert_eq!(second.covariates[2], None);
        assert_eq!(second.covariates[3], None);
    }

    #[test]
    fn columns_in_any_order() {
        let f = write_csv("forest,detected,day_of_year,year,longitude,latitude,checklist_id\n0.5,FALSE,3,2019,10.0,50.0,A\n");
        let set = ObservationReader::new(f.path()).read().unwrap();
        assert_eq!(set.schema().names(), &["forest", "day_of_year", "year"]);
        assert_eq!(set.observations()[0].location.latitude, 50.0);
    }

    #[test]
    fn error_missing_column() {
        let f = write_csv("checklist_id,latitude,longitude,year,day_of_year\nS1,1,1,2020,1\n");
        let result = ObservationReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::MissingColumn { column: "detected", .. })));
    }

    #[test]
    fn error_empty_dataset() {
        assert!(matches!(read(""), Err(IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_inconsistent_row_length() {
        let result = read("S1,40.1,-75.2,1,2020,150,6.5,0.3\nS2,40.1,-75.2,1,2020,150\n");
        assert!(matches!(
            result,
            Err(IoError::InconsistentRowLength { row_index: 1, .. })
        ));
    }

    #[test]
    fn error_non_finite_and_unparseable() {
        assert!(matches!(
            read("S1,40.1,-75.2,1,2020,150,inf,0.3\n"),
            Err(IoError::NonFiniteValue { .. })
        ));
        assert!(matches!(
            read("S1,40.1,-75.2,1,2020,150,6.0,abc\n"),
            Err(IoError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn error_invalid_detected_and_date() {
        assert!(matches!(
            read("S1,40.1,-75.2,yes,2020,150,6.0,0.1\n"),
            Err(IoError::InvalidDetected { .. })
        ));
        assert!(matches!(
            read("S1,40.1,-75.2,1,2020,NA,6.0,0.1\n"),
            Err(IoError::InvalidDate { column: "day_of_year", .. })
        ));
        assert!(matches!(
            read("S1,40.1,-75.2,1,2020,400,6.0,0.1\n"),
            Err(IoError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn error_out_of_range_coordinate() {
        assert!(matches!(
            read("S1,95.0,-75.2,1,2020,150,6.0,0.1\n"),
            Err(IoError::InvalidRecord { row_index: 0, .. })
        ));
    }

    #[test]
    fn error_duplicate_id() {
        let result = read("S1,40,-75,1,2020,1,6,0\nS2,40,-75,1,2020,1,6,0\nS1,40,-75,1,2020,1,6,0\n");
        assert!(matches!(
            result,
            Err(IoError::DuplicateId {
                first_row: 0,
                second_row: 2,
                ..
            })
        ));
    }

    #[test]
    fn error_file_not_found() {
        let result = ObservationReader::new(Path::new("/nonexistent/records.csv")).read();
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }
}
