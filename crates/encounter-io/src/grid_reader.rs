//! CSV prediction grid reader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use encounter_model::{PredictionGrid, PredictionGridPoint};
use encounter_survey::GeoPoint;
use tracing::{info, instrument};

use crate::IoError;

const ID: &str = "id";
const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";

/// Reads a prediction grid from a CSV file.
///
/// Expected CSV format: `id,latitude,longitude,<habitat columns...>` with
/// every value present and finite.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | `id`, `latitude`, or `longitude` absent |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Cell is missing, NaN, Inf, or unparseable |
/// | [`IoError::InvalidRecord`] | Coordinates out of range |
/// | [`IoError::DuplicateId`] | Same `id` appears twice |
pub struct GridReader {
    path: PathBuf,
}

impl GridReader {
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

    fn value(
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

    /// Read and validate the CSV file, returning a [`PredictionGrid`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<PredictionGrid, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        let find = |name: &'static str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| IoError::MissingColumn {
                    path: self.path.clone(),
                    column: name,
                })
        };
        let (id_col, lat_col, lon_col) = (find(ID)?, find(LATITUDE)?, find(LONGITUDE)?);
        let habitat_columns: Vec<usize> = (0..header.len())
            .filter(|i| ![id_col, lat_col, lon_col].contains(i))
            .collect();
        let habitat_names: Vec<String> = habitat_columns
            .iter()
            .map(|&i| header[i].trim().to_string())
            .collect();

        let mut points = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            let id = record.get(id_col).unwrap_or("").trim().to_string();
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

            let location = GeoPoint::new(
                self.value(&record, &header, lat_col, row_index)?,
                self.value(&record, &header, lon_col, row_index)?,
            )
            .map_err(|e| IoError::InvalidRecord {
                path: self.path.clone(),
                row_index,
                source: e,
            })?;
            let habitat = habitat_columns
                .iter()
                .map(|&col| self.value(&record, &header, col, row_index))
                .collect::<Result<Vec<_>, _>>()?;
            points.push(PredictionGridPoint::new(id, location, habitat));
        }

        if points.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let grid = PredictionGrid::new(habitat_names, points)?;
        info!(
            n_points = grid.len(),
            n_habitat = grid.habitat_names().len(),
            "prediction grid loaded"
        );
        Ok(grid)
    }
}
