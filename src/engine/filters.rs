use tracing::debug;
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::driver::Driver;
use crate::models::gender::Gender;
use crate::models::location::GeoPoint;

/// A driver considered for one matching run.
#[derive(Debug, Clone)]
pub struct DriverCandidate {
    pub driver_id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub gender: Option<Gender>,
    pub is_available: bool,
    pub location: GeoPoint,
}

impl DriverCandidate {
    pub fn from_profile(driver: &Driver, location: GeoPoint) -> Self {
        Self {
            driver_id: driver.id,
            account_id: driver.account_id,
            name: driver.name.clone(),
            phone_number: driver.phone_number.clone(),
            gender: driver.gender,
            is_available: driver.is_available,
            location,
        }
    }
}

/// Booking attributes the filters decide on.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub booking_id: Uuid,
    pub pickup: GeoPoint,
    pub passenger_gender: Option<Gender>,
}

pub trait DriverFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        candidates: Vec<DriverCandidate>,
        request: &MatchRequest,
    ) -> Vec<DriverCandidate>;
}

/// Filters applied in order, each seeing only what the previous one kept.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn DriverFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Availability, then distance to pickup, then the safety rule.
    pub fn standard(max_pickup_distance_km: f64) -> Self {
        Self::new()
            .with(AvailabilityFilter)
            .with(DistanceFilter::new(max_pickup_distance_km))
            .with(SafetyFilter::default())
    }

    pub fn with(mut self, filter: impl DriverFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(
        &self,
        candidates: Vec<DriverCandidate>,
        request: &MatchRequest,
    ) -> Vec<DriverCandidate> {
        self.filters.iter().fold(candidates, |remaining, filter| {
            if remaining.is_empty() {
                return remaining;
            }
            let before = remaining.len();
            let kept = filter.apply(remaining, request);
            debug!(
                booking_id = %request.booking_id,
                filter = filter.name(),
                before,
                after = kept.len(),
                "filter applied"
            );
            kept
        })
    }
}

/// Drops drivers who are flagged unavailable (on a ride or off duty).
pub struct AvailabilityFilter;

impl DriverFilter for AvailabilityFilter {
    fn name(&self) -> &'static str {
        "availability"
    }

    fn apply(
        &self,
        candidates: Vec<DriverCandidate>,
        _request: &MatchRequest,
    ) -> Vec<DriverCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| candidate.is_available)
            .collect()
    }
}

/// Re-checks pickup distance against the candidate's latest position.
pub struct DistanceFilter {
    max_distance_km: f64,
}

impl DistanceFilter {
    pub fn new(max_distance_km: f64) -> Self {
        Self { max_distance_km }
    }
}

impl DriverFilter for DistanceFilter {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn apply(
        &self,
        candidates: Vec<DriverCandidate>,
        request: &MatchRequest,
    ) -> Vec<DriverCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| {
                haversine_km(&request.pickup, &candidate.location) <= self.max_distance_km
            })
            .collect()
    }
}

/// Drivers of the restricted category only serve passengers of that same category.
pub struct SafetyFilter {
    restricted: Gender,
}

impl SafetyFilter {
    pub fn new(restricted: Gender) -> Self {
        Self { restricted }
    }
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::new(Gender::Male)
    }
}

impl DriverFilter for SafetyFilter {
    fn name(&self) -> &'static str {
        "safety"
    }

    fn apply(
        &self,
        candidates: Vec<DriverCandidate>,
        request: &MatchRequest,
    ) -> Vec<DriverCandidate> {
        let passenger = Gender::or_default(request.passenger_gender);

        candidates
            .into_iter()
            .filter(|candidate| {
                Gender::or_default(candidate.gender) != self.restricted
                    || passenger == self.restricted
            })
            .collect()
    }
}
