use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::location::LocationIndex;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::location::GeoPoint;
use crate::observability::metrics::Metrics;
use crate::store::Directory;

/// Driver-side operations outside the booking lifecycle.
pub struct DriverService {
    directory: Arc<dyn Directory>,
    locations: Arc<LocationIndex>,
    metrics: Metrics,
}

impl DriverService {
    pub fn new(directory: Arc<dyn Directory>, locations: Arc<LocationIndex>, metrics: Metrics) -> Self {
        Self {
            directory,
            locations,
            metrics,
        }
    }

    /// Records a position report. The index is keyed by account identity,
    /// the same key the matching pipeline resolves profiles from.
    pub async fn update_location(
        &self,
        driver_account: Uuid,
        lat: f64,
        lng: f64,
    ) -> Result<GeoPoint, AppError> {
        let location = GeoPoint::validated(lat, lng)?;
        let driver = self.directory.driver_by_account(driver_account).await?;

        let tracked = self.locations.update_location(driver_account, location);
        self.metrics.tracked_drivers.set(tracked as i64);
        self.directory
            .record_driver_location(driver.id, location)
            .await?;

        debug!(driver_id = %driver.id, lat, lng, "driver location updated");
        Ok(location)
    }

    pub async fn set_availability(
        &self,
        driver_account: Uuid,
        available: bool,
    ) -> Result<Driver, AppError> {
        let driver = self.directory.driver_by_account(driver_account).await?;
        let updated = self
            .directory
            .set_driver_availability(driver.id, available)
            .await?;

        info!(driver_id = %driver.id, available, "driver availability changed");
        Ok(updated)
    }
}
