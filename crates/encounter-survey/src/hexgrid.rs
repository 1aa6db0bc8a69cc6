//! Equal-area hexagonal cell indexing.
//!
//! Points are projected with the Lambert cylindrical equal-area projection
//! (`x = R·λ`, `y = R·sin φ`) and located on an affine hexagonal lattice in
//! projected space. The projection preserves area, so every lattice cell
//! covers the same area on the sphere at any latitude.
//!
//! The lattice is pointy-top with odd rows shifted half a column. Its column
//! pitch `w` is stretched so that an integer number of columns spans the
//! circumference, and its row pitch `h` is set so that `w·h = √3/2·s²`, the
//! area of a regular hexagon with centre spacing `s`. Cells in the outermost
//! row at each pole are cut by the projection boundary at `y = ±R` and are
//! smaller.

use std::f64::consts::PI;

use crate::SurveyError;
use crate::geo::{GeoPoint, check_coordinate};

/// Authalic radius of the WGS84 ellipsoid, in kilometres.
pub const AUTHALIC_RADIUS_KM: f64 = 6371.0072;

const SQRT3_2: f64 = 0.866_025_403_784_438_6;

/// An equal-area hexagonal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CellId(pub u64);

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps coordinates to equal-area hexagonal cells of a fixed spacing.
#[derive(Debug, Clone)]
pub struct HexGridIndexer {
    spacing_km: f64,
    radius_km: f64,
    n_cols: u64,
    col_pitch: f64,
    row_pitch: f64,
    row_min: i64,
    row_max: i64,
}

impl HexGridIndexer {
    /// Create an indexer with centre spacing `spacing_km` on a sphere of
    /// radius [`AUTHALIC_RADIUS_KM`].
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidSpacing`] when the spacing is not finite,
    /// not positive, or exceeds half the circumference.
    pub fn new(spacing_km: f64) -> Result<Self, SurveyError> {
        Self::with_earth_radius_km(spacing_km, AUTHALIC_RADIUS_KM)
    }

    /// Create an indexer on a sphere of the given radius.
    ///
    /// # Errors
    ///
    /// | Variant                              | When                                     |
    /// |--------------------------------------|------------------------------------------|
    /// | [`SurveyError::InvalidEarthRadius`]  | radius not finite or not positive        |
    /// | [`SurveyError::InvalidSpacing`]      | spacing outside (0, πR]                  |
    pub fn with_earth_radius_km(spacing_km: f64, radius_km: f64) -> Result<Self, SurveyError> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(SurveyError::InvalidEarthRadius { radius_km });
        }
        let circumference = 2.0 * PI * radius_km;
        let max_km = circumference / 2.0;
        if !spacing_km.is_finite() || spacing_km <= 0.0 || spacing_km > max_km {
            return Err(SurveyError::InvalidSpacing { spacing_km, max_km });
        }

        let n_cols = ((circumference / spacing_km).round() as u64).max(2);
        let col_pitch = circumference / n_cols as f64;
        let row_pitch = spacing_km * spacing_km * SQRT3_2 / col_pitch;
        let row_min = (-radius_km / row_pitch).floor() as i64;
        let row_max = (radius_km / row_pitch).floor() as i64 + 1;

        Ok(Self {
            spacing_km,
            radius_km,
            n_cols,
            col_pitch,
            row_pitch,
            row_min,
            row_max,
        })
    }

    /// Return the nominal centre spacing in kilometres.
    #[must_use]
    pub fn spacing_km(&self) -> f64 {
        self.spacing_km
    }

    /// Return the number of cell columns around the circumference.
    #[must_use]
    pub fn n_columns(&self) -> u64 {
        self.n_cols
    }

    /// Return the area of every non-polar cell, `√3/2·spacing²` km².
    #[must_use]
    pub fn cell_area_km2(&self) -> f64 {
        self.col_pitch * self.row_pitch
    }

    /// Return the cell containing the point.
    ///
    /// Longitudes -180 and 180 map to the same cell.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidCoordinate`] for non-finite or
    /// out-of-range coordinates.
    pub fn cell_id(&self, latitude: f64, longitude: f64) -> Result<CellId, SurveyError> {
        check_coordinate(latitude, longitude)?;
        let longitude = if longitude >= 180.0 { longitude - 360.0 } else { longitude };

        // Lattice units: u counts columns east of the antimeridian, v counts rows.
        let x = (longitude.to_radians() + PI) * self.radius_km;
        let y = latitude.to_radians().sin() * self.radius_km;
        let u = x / self.col_pitch;
        let v = y / self.row_pitch;

        // The nearest centre in a triangular lattice is a vertex of the
        // enclosing triangle, which lies in one of the two bracketing rows.
        let r0 = v.floor() as i64;
        let mut best = (i64::MIN, i64::MIN);
        let mut best_dist = f64::INFINITY;
        for row in [r0, r0 + 1] {
            let shift = 0.5 * row.rem_euclid(2) as f64;
            let col = (u - shift + 0.5).floor();
            let du = u - (col + shift);
            let dv = (v - row as f64) * SQRT3_2;
            let dist = du * du + dv * dv;
            if dist < best_dist {
                best_dist = dist;
                best = (row, col as i64);
            }
        }

        let (row, col) = best;
        let row = row.clamp(self.row_min, self.row_max);
        let col = col.rem_euclid(self.n_cols as i64) as u64;
        Ok(CellId((row - self.row_min) as u64 * self.n_cols + col))
    }

    /// Return the centre of a cell, or `None` if the id is out of range.
    ///
    /// Polar rows whose nominal centre lies beyond the projection boundary
    /// report the pole latitude.
    #[must_use]
    pub fn cell_center(&self, cell: CellId) -> Option<GeoPoint> {
        let n_rows = (self.row_max - self.row_min + 1) as u64;
        if cell.0 >= n_rows * self.n_cols {
            return None;
        }
        let row = (cell.0 / self.n_cols) as i64 + self.row_min;
        let col = cell.0 % self.n_cols;
        let shift = 0.5 * row.rem_euclid(2) as f64;

        let x = (col as f64 + shift) * self.col_pitch;
        let y = (row as f64 * self.row_pitch).clamp(-self.radius_km, self.radius_km);

        let latitude = (y / self.radius_km).asin().to_degrees();
        let mut longitude = (x / self.radius_km - PI).to_degrees();
        if longitude >= 180.0 {
            longitude -= 360.0;
        }
        Some(GeoPoint {
            latitude,
            longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Integrate `R² cos φ dφ dλ` over a fine lat/lon lattice around
    /// `center`, counting only sample points that land in `cell`.
    fn integrated_area(grid: &HexGridIndexer, cell: CellId, center: GeoPoint) -> f64 {
        let r = AUTHALIC_RADIUS_KM;
        // Box comfortably larger than one cell.
        let half_lat = (1.5 * grid.spacing_km() / (r * center.latitude.to_radians().cos()))
            .to_degrees()
            .min(30.0);
        let half_lon = (1.5 * grid.spacing_km() / r).to_degrees();
        let steps = 600;
        let d_lat = 2.0 * half_lat / steps as f64;
        let d_lon = 2.0 * half_lon / steps as f64;

        let mut area = 0.0;
        for i in 0..steps {
            let lat = center.latitude - half_lat + (i as f64 + 0.5) * d_lat;
            if lat.abs() >= 90.0 {
                continue;
            }
            let band = r * r * lat.to_radians().cos() * d_lat.to_radians() * d_lon.to_radians();
            for j in 0..steps {
                let mut lon = center.longitude - half_lon + (j as f64 + 0.5) * d_lon;
                if lon < -180.0 {
                    lon += 360.0;
                } else if lon > 180.0 {
                    lon -= 360.0;
                }
                if grid.cell_id(lat, lon).unwrap() == cell {
                    area += band;
                }
            }
        }
        area
    }

    #[test]
    fn cell_area_is_latitude_independent() {
        for spacing in [50.0, 150.0] {
            let grid = HexGridIndexer::new(spacing).unwrap();
            let nominal = SQRT3_2 * spacing * spacing;
            assert!((grid.cell_area_km2() - nominal).abs() / nominal < 1e-12);
            for lat in [0.0, 35.0, 60.0, 75.0] {
                let cell = grid.cell_id(lat, 10.0).unwrap();
                let center = grid.cell_center(cell).unwrap();
                let area = integrated_area(&grid, cell, center);
                let rel = (area - nominal).abs() / nominal;
                assert!(
                    rel < 0.03,
                    "spacing {spacing} lat {lat}: area {area} vs nominal {nominal}"
                );
            }
        }
    }

    #[test]
    fn antimeridian_longitudes_share_a_cell() {
        let grid = HexGridIndexer::new(5.0).unwrap();
        for lat in [-45.0, 0.0, 12.3, 60.0] {
            assert_eq!(
                grid.cell_id(lat, 180.0).unwrap(),
                grid.cell_id(lat, -180.0).unwrap()
            );
        }
    }

    #[test]
    fn deterministic_and_spacing_dependent() {
        let a = HexGridIndexer::new(5.0).unwrap();
        let b = HexGridIndexer::new(5.0).unwrap();
        let c = HexGridIndexer::new(50.0).unwrap();
        let p = (42.4534, -76.4735);
        assert_eq!(a.cell_id(p.0, p.1).unwrap(), b.cell_id(p.0, p.1).unwrap());
        assert_ne!(a.cell_id(p.0, p.1).unwrap(), c.cell_id(p.0, p.1).unwrap());
    }

    #[test]
    fn nearby_points_share_distant_points_do_not() {
        let grid = HexGridIndexer::new(5.0).unwrap();
        let center = grid.cell_center(grid.cell_id(42.0, -76.0).unwrap()).unwrap();
        let here = grid.cell_id(center.latitude, center.longitude).unwrap();
        // ~100 m north of the centre stays in the cell.
        assert_eq!(grid.cell_id(center.latitude + 0.0009, center.longitude).unwrap(), here);
        // ~50 km away never does.
        assert_ne!(grid.cell_id(center.latitude + 0.45, center.longitude).unwrap(), here);
    }

    #[test]
    fn invalid_inputs() {
        assert!(matches!(
            HexGridIndexer::new(0.0),
            Err(SurveyError::InvalidSpacing { .. })
        ));
        assert!(HexGridIndexer::new(f64::NAN).is_err());
        assert!(HexGridIndexer::new(30_000.0).is_err());
        assert!(HexGridIndexer::with_earth_radius_km(5.0, -1.0).is_err());
        let grid = HexGridIndexer::new(5.0).unwrap();
        assert!(matches!(
            grid.cell_id(91.0, 0.0),
            Err(SurveyError::InvalidCoordinate { .. })
        ));
        assert!(grid.cell_id(0.0, f64::INFINITY).is_err());
        assert!(grid.cell_center(CellId(u64::MAX)).is_none());
    }

    #[test]
    fn poles_are_indexable() {
        let grid = HexGridIndexer::new(25.0).unwrap();
        let north = grid.cell_id(90.0, 0.0).unwrap();
        let south = grid.cell_id(-90.0, 0.0).unwrap();
        assert_ne!(north, south);
        assert!(grid.cell_center(north).is_some());
        assert!(grid.cell_center(south).is_some());
    }
}
