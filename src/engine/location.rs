use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::location::GeoPoint;

/// Last reported position per driver account.
///
/// Lookups scan every tracked driver. Entries are never expired, so a driver
/// who stopped reporting keeps appearing at their last position.
#[derive(Default)]
pub struct LocationIndex {
    locations: RwLock<HashMap<Uuid, GeoPoint>>,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the driver's position. Returns the number of tracked drivers.
    pub fn update_location(&self, driver_account_id: Uuid, location: GeoPoint) -> usize {
        let mut locations = self
            .locations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        locations.insert(driver_account_id, location);
        locations.len()
    }

    /// Drivers whose last position is within `radius_km` of `center`, inclusive.
    pub fn nearby_drivers(&self, center: &GeoPoint, radius_km: f64) -> Vec<Uuid> {
        let locations = self
            .locations
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        locations
            .iter()
            .filter(|(_, location)| haversine_km(center, location) <= radius_km)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn location_of(&self, driver_account_id: Uuid) -> Option<GeoPoint> {
        self.locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&driver_account_id)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
