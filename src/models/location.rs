use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Rejects coordinates outside the WGS84 decimal-degree ranges.
    pub fn validated(lat: f64, lng: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::InvalidInput(format!(
                "latitude {lat} must be within [-90, 90]"
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::InvalidInput(format!(
                "longitude {lng} must be within [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        Self::validated(self.lat, self.lng).map(|_| ())
    }
}
