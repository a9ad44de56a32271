use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::Driver;
use crate::models::gender::Gender;
use crate::models::location::GeoPoint;
use crate::models::page::PageRequest;
use crate::models::passenger::Passenger;
use crate::models::receipt::Receipt;
use crate::models::review::{RatedParty, RatingSummary, Review, ReviewerRole};
use crate::store::{BookingStore, Directory, ReviewStore, Settlement};

/// Process-local backing store. Each `DashMap` shard guard acts as the row
/// lock for compare-and-set updates.
///
/// Guards are always taken in the order reviews -> bookings -> profiles.
#[derive(Default)]
pub struct InMemoryStore {
    bookings: DashMap<Uuid, Booking>,
    passengers: DashMap<Uuid, Passenger>,
    passenger_accounts: DashMap<Uuid, Uuid>,
    drivers: DashMap<Uuid, Driver>,
    driver_accounts: DashMap<Uuid, Uuid>,
    reviews: DashMap<(Uuid, ReviewerRole), Review>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_passenger(
        &self,
        account_id: Uuid,
        name: String,
        phone_number: String,
        gender: Option<Gender>,
    ) -> Result<Passenger, AppError> {
        let passenger = Passenger {
            id: Uuid::new_v4(),
            account_id,
            name,
            phone_number,
            gender,
            average_rating: 0.0,
            rating_count: 0,
            created_at: Utc::now(),
        };

        match self.passenger_accounts.entry(account_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "account {account_id} already has a passenger profile"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(passenger.id);
                self.passengers.insert(passenger.id, passenger.clone());
                Ok(passenger)
            }
        }
    }

    pub fn register_driver(
        &self,
        account_id: Uuid,
        name: String,
        phone_number: String,
        gender: Option<Gender>,
    ) -> Result<Driver, AppError> {
        let driver = Driver {
            id: Uuid::new_v4(),
            account_id,
            name,
            phone_number,
            gender,
            is_available: true,
            average_rating: 0.0,
            rating_count: 0,
            last_known_location: None,
            updated_at: Utc::now(),
        };

        match self.driver_accounts.entry(account_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "account {account_id} already has a driver profile"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(driver.id);
                self.drivers.insert(driver.id, driver.clone());
                Ok(driver)
            }
        }
    }

    pub fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn passenger_count(&self) -> usize {
        self.passengers.len()
    }

    /// Overwrites a passenger's rating aggregate; used to seed fixtures.
    pub fn set_passenger_rating(&self, id: Uuid, summary: RatingSummary) -> Result<(), AppError> {
        let mut passenger = self
            .passengers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("passenger {id} not found")))?;
        passenger.average_rating = summary.average_rating;
        passenger.rating_count = summary.rating_count;
        Ok(())
    }
}

fn booking_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("booking {id} not found"))
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn create(&self, booking: Booking) -> Result<Booking, AppError> {
        match self.bookings.entry(booking.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "booking {} already exists",
                booking.id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(booking).value().clone()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Booking, AppError> {
        self.bookings
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| booking_not_found(id))
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<Booking, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| booking_not_found(id))?;

        if booking.status != expected {
            return Err(AppError::Conflict(format!(
                "booking {id} is {} (expected {expected})",
                booking.status
            )));
        }
        if next.holds_driver() && booking.driver_id.is_none() {
            return Err(AppError::Internal(format!(
                "booking {id} cannot become {next} without an assigned driver"
            )));
        }

        if next.releases_driver() {
            if let Some(mut driver) = booking
                .driver_id
                .and_then(|driver_id| self.drivers.get_mut(&driver_id))
            {
                driver.is_available = true;
                driver.updated_at = Utc::now();
            }
        }

        booking.status = next;
        if !next.holds_driver() {
            booking.driver_id = None;
        }
        booking.updated_at = Utc::now();

        Ok(booking.clone())
    }

    async fn assign_driver_if_requested(
        &self,
        id: Uuid,
        driver_id: Uuid,
    ) -> Result<Booking, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| booking_not_found(id))?;

        if booking.status != BookingStatus::Requested {
            return Err(AppError::Conflict(format!(
                "booking {id} is no longer available"
            )));
        }
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        driver.is_available = false;
        driver.updated_at = Utc::now();
        booking.status = BookingStatus::Accepted;
        booking.driver_id = Some(driver_id);
        booking.updated_at = Utc::now();

        Ok(booking.clone())
    }

    async fn replace_notified_drivers(
        &self,
        id: Uuid,
        driver_ids: &[Uuid],
    ) -> Result<(), AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| booking_not_found(id))?;

        if booking.status != BookingStatus::Requested {
            return Err(AppError::Conflict(format!(
                "booking {id} is {}; notified drivers are frozen",
                booking.status
            )));
        }

        booking.notified_drivers = driver_ids.iter().copied().collect();
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn is_driver_notified(&self, id: Uuid, driver_id: Uuid) -> Result<bool, AppError> {
        self.bookings
            .get(&id)
            .map(|booking| booking.notified_drivers.contains(&driver_id))
            .ok_or_else(|| booking_not_found(id))
    }

    async fn due_scheduled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, AppError> {
        let mut due: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| {
                let booking = entry.value();
                booking.status == BookingStatus::Scheduled
                    && booking.scheduled_for.is_some_and(|at| at <= cutoff)
            })
            .map(|entry| entry.value().clone())
            .collect();

        due.sort_by_key(|booking| booking.scheduled_for);
        Ok(due)
    }

    async fn pending_for_driver(
        &self,
        driver_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<Booking>, AppError> {
        let (offset, limit) = page.offset_and_limit();

        let mut pending: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| {
                let booking = entry.value();
                booking.status == BookingStatus::Requested
                    && booking.notified_drivers.contains(&driver_id)
            })
            .map(|entry| entry.value().clone())
            .collect();

        pending.sort_by_key(|booking| (booking.created_at, booking.id));
        Ok(pending.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl Directory for InMemoryStore {
    async fn passenger_by_account(&self, account_id: Uuid) -> Result<Passenger, AppError> {
        let id = self
            .passenger_accounts
            .get(&account_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                AppError::NotFound(format!("no passenger profile for account {account_id}"))
            })?;
        self.passenger(id).await
    }

    async fn passenger(&self, id: Uuid) -> Result<Passenger, AppError> {
        self.passengers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("passenger {id} not found")))
    }

    async fn driver_by_account(&self, account_id: Uuid) -> Result<Driver, AppError> {
        let id = self
            .driver_accounts
            .get(&account_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                AppError::NotFound(format!("no driver profile for account {account_id}"))
            })?;
        self.driver(id)
    }

    async fn drivers_by_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Driver>, AppError> {
        let drivers = account_ids
            .iter()
            .filter_map(|account_id| {
                let id = *self.driver_accounts.get(account_id)?.value();
                self.drivers.get(&id).map(|entry| entry.value().clone())
            })
            .collect();
        Ok(drivers)
    }

    async fn set_driver_availability(
        &self,
        driver_id: Uuid,
        available: bool,
    ) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        driver.is_available = available;
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    }

    async fn record_driver_location(
        &self,
        driver_id: Uuid,
        location: GeoPoint,
    ) -> Result<(), AppError> {
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        driver.last_known_location = Some(location);
        driver.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn submit_review(&self, review: Review) -> Result<RatingSummary, AppError> {
        if !(1..=5).contains(&review.rating) {
            return Err(AppError::InvalidInput(format!(
                "rating {} must be between 1 and 5",
                review.rating
            )));
        }

        let slot = match self.reviews.entry((review.booking_id, review.author)) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "booking {} already has a review from this party",
                    review.booking_id
                )));
            }
            Entry::Vacant(slot) => slot,
        };

        let mut booking = self
            .bookings
            .get_mut(&review.booking_id)
            .ok_or_else(|| booking_not_found(review.booking_id))?;

        let summary = match review.rated {
            RatedParty::Driver(id) => {
                let mut driver = self
                    .drivers
                    .get_mut(&id)
                    .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
                let next = RatingSummary {
                    average_rating: driver.average_rating,
                    rating_count: driver.rating_count,
                }
                .with_rating(review.rating);
                driver.average_rating = next.average_rating;
                driver.rating_count = next.rating_count;
                next
            }
            RatedParty::Passenger(id) => {
                let mut passenger = self
                    .passengers
                    .get_mut(&id)
                    .ok_or_else(|| AppError::NotFound(format!("passenger {id} not found")))?;
                let next = RatingSummary {
                    average_rating: passenger.average_rating,
                    rating_count: passenger.rating_count,
                }
                .with_rating(review.rating);
                passenger.average_rating = next.average_rating;
                passenger.rating_count = next.rating_count;
                next
            }
        };

        match review.author {
            ReviewerRole::Passenger => booking.review_by_passenger = Some(review.id),
            ReviewerRole::Driver => booking.review_by_driver = Some(review.id),
        }
        booking.updated_at = Utc::now();

        slot.insert(review);
        Ok(summary)
    }
}

const BASE_FARE: f64 = 5.0;
const FARE_PER_KM: f64 = 2.0;
const CURRENCY: &str = "USD";

/// Receipt book standing in for the payment side. Charges a flat base fare
/// plus a per-km rate over the straight-line pickup to dropoff distance.
#[derive(Default)]
pub struct InMemoryLedger {
    receipts: DashMap<Uuid, Receipt>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipt_for(&self, booking_id: Uuid) -> Option<Receipt> {
        self.receipts
            .get(&booking_id)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl Settlement for InMemoryLedger {
    async fn settle(&self, booking: &Booking) -> Result<Receipt, AppError> {
        let distance_km = haversine_km(&booking.pickup, &booking.dropoff);
        let amount = ((BASE_FARE + distance_km * FARE_PER_KM) * 100.0).round() / 100.0;

        match self.receipts.entry(booking.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "booking {} is already settled",
                booking.id
            ))),
            Entry::Vacant(slot) => {
                let receipt = Receipt {
                    id: Uuid::new_v4(),
                    booking_id: booking.id,
                    amount,
                    currency: CURRENCY.to_string(),
                    issued_at: Utc::now(),
                };
                Ok(slot.insert(receipt).value().clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{InMemoryLedger, InMemoryStore};
    use crate::error::AppError;
    use crate::models::booking::{Booking, BookingStatus};
    use crate::models::location::GeoPoint;
    use crate::models::page::PageRequest;
    use crate::store::{BookingStore, Settlement};

    fn booking(status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            driver_id: None,
            status,
            pickup: GeoPoint::new(12.9, 77.6),
            dropoff: GeoPoint::new(12.95, 77.65),
            scheduled_for: None,
            ride_start_code_id: None,
            notified_drivers: BTreeSet::new(),
            review_by_passenger: None,
            review_by_driver: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn driver(store: &InMemoryStore) -> Uuid {
        store
            .register_driver(Uuid::new_v4(), "Ravi".to_string(), "+915550199".to_string(), None)
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn assignment_only_wins_from_requested() {
        let store = InMemoryStore::new();
        let created = store.create(booking(BookingStatus::Requested)).await.unwrap();
        let first = driver(&store);

        let accepted = store
            .assign_driver_if_requested(created.id, first)
            .await
            .unwrap();
        assert_eq!(accepted.status, BookingStatus::Accepted);
        assert_eq!(accepted.driver_id, Some(first));

        let err = store
            .assign_driver_if_requested(created.id, driver(&store))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.get(created.id).await.unwrap().driver_id, Some(first));
    }

    #[tokio::test]
    async fn cancelling_clears_driver_reference() {
        let store = InMemoryStore::new();
        let created = store.create(booking(BookingStatus::Requested)).await.unwrap();
        let driver_id = driver(&store);
        store
            .assign_driver_if_requested(created.id, driver_id)
            .await
            .unwrap();
        assert!(!store.driver(driver_id).unwrap().is_available);

        let cancelled = store
            .transition(created.id, BookingStatus::Accepted, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.driver_id.is_none());
        assert!(store.driver(driver_id).unwrap().is_available);
    }

    #[tokio::test]
    async fn completing_keeps_driver_reference_and_frees_driver() {
        let store = InMemoryStore::new();
        let created = store.create(booking(BookingStatus::Requested)).await.unwrap();
        let driver_id = driver(&store);
        store
            .assign_driver_if_requested(created.id, driver_id)
            .await
            .unwrap();
        store
            .transition(created.id, BookingStatus::Accepted, BookingStatus::Started)
            .await
            .unwrap();
        assert!(!store.driver(driver_id).unwrap().is_available);

        let completed = store
            .transition(created.id, BookingStatus::Started, BookingStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.driver_id, Some(driver_id));
        assert!(store.driver(driver_id).unwrap().is_available);
    }

    #[tokio::test]
    async fn assignment_of_unknown_driver_leaves_booking_requested() {
        let store = InMemoryStore::new();
        let created = store.create(booking(BookingStatus::Requested)).await.unwrap();

        let err = store
            .assign_driver_if_requested(created.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let stored = store.get(created.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Requested);
        assert!(stored.driver_id.is_none());
    }

    #[tokio::test]
    async fn transition_refuses_driverless_acceptance() {
        let store = InMemoryStore::new();
        let created = store.create(booking(BookingStatus::Requested)).await.unwrap();

        let err = store
            .transition(created.id, BookingStatus::Requested, BookingStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn notified_set_is_replaced_not_accumulated() {
        let store = InMemoryStore::new();
        let created = store.create(booking(BookingStatus::Requested)).await.unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store.replace_notified_drivers(created.id, &[a]).await.unwrap();
        store.replace_notified_drivers(created.id, &[b]).await.unwrap();

        assert!(!store.is_driver_notified(created.id, a).await.unwrap());
        assert!(store.is_driver_notified(created.id, b).await.unwrap());
    }

    #[tokio::test]
    async fn notified_set_is_frozen_after_assignment() {
        let store = InMemoryStore::new();
        let created = store.create(booking(BookingStatus::Requested)).await.unwrap();
        let driver_id = driver(&store);
        store.replace_notified_drivers(created.id, &[driver_id]).await.unwrap();
        store
            .assign_driver_if_requested(created.id, driver_id)
            .await
            .unwrap();

        let err = store
            .replace_notified_drivers(created.id, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.is_driver_notified(created.id, driver_id).await.unwrap());
    }

    #[tokio::test]
    async fn due_scheduled_respects_cutoff() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let mut soon = booking(BookingStatus::Scheduled);
        soon.scheduled_for = Some(now + Duration::minutes(10));
        let mut later = booking(BookingStatus::Scheduled);
        later.scheduled_for = Some(now + Duration::hours(2));
        let soon = store.create(soon).await.unwrap();
        store.create(later).await.unwrap();
        store.create(booking(BookingStatus::Requested)).await.unwrap();

        let due = store
            .due_scheduled(now + Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, soon.id);
    }

    #[tokio::test]
    async fn pending_rides_are_paginated() {
        let store = InMemoryStore::new();
        let driver = Uuid::new_v4();

        for _ in 0..3 {
            let created = store.create(booking(BookingStatus::Requested)).await.unwrap();
            store
                .replace_notified_drivers(created.id, &[driver])
                .await
                .unwrap();
        }
        store.create(booking(BookingStatus::Requested)).await.unwrap();

        let first = store
            .pending_for_driver(driver, PageRequest::new(1, 2))
            .await
            .unwrap();
        let second = store
            .pending_for_driver(driver, PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(first.iter().all(|b| b.id != second[0].id));
    }

    #[tokio::test]
    async fn ledger_settles_once() {
        let ledger = InMemoryLedger::new();
        let ride = booking(BookingStatus::Completed);

        let receipt = ledger.settle(&ride).await.unwrap();
        assert!(receipt.amount > 5.0);
        assert_eq!(ledger.receipt_for(ride.id).unwrap().id, receipt.id);
        assert!(matches!(
            ledger.settle(&ride).await.unwrap_err(),
            AppError::Conflict(_)
        ));
    }
}
