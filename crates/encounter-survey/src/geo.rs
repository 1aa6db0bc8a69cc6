use crate::SurveyError;

/// A point on the sphere in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    /// Latitude in [-90, 90].
    pub latitude: f64,
    /// Longitude in [-180, 180].
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a validated point.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidCoordinate`] when either value is
    /// non-finite or out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, SurveyError> {
        check_coordinate(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

pub(crate) fn check_coordinate(latitude: f64, longitude: f64) -> Result<(), SurveyError> {
    let valid = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if !valid {
        return Err(SurveyError::InvalidCoordinate {
            latitude,
            longitude,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundaries() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.1).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }
}
