//! Contracts of the collaborators the dispatch core consumes.
//!
//! Implementations must provide row-level atomicity for the status
//! compare-and-set operations; the core never emulates them with a read
//! followed by a write.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::Driver;
use crate::models::location::GeoPoint;
use crate::models::otp::OneTimeCode;
use crate::models::page::PageRequest;
use crate::models::passenger::Passenger;
use crate::models::receipt::Receipt;
use crate::models::review::{RatingSummary, Review};

pub use memory::{InMemoryLedger, InMemoryStore};

/// Handles to every collaborator the booking operations need.
#[derive(Clone)]
pub struct Collaborators {
    pub bookings: Arc<dyn BookingStore>,
    pub directory: Arc<dyn Directory>,
    pub reviews: Arc<dyn ReviewStore>,
    pub otp: Arc<dyn OtpIssuer>,
    pub settlement: Arc<dyn Settlement>,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create(&self, booking: Booking) -> Result<Booking, AppError>;

    async fn get(&self, id: Uuid) -> Result<Booking, AppError>;

    /// Moves the booking from `expected` to `next`, failing with `Conflict` if
    /// the stored status is no longer `expected`. The driver reference is
    /// cleared when `next` does not hold one, and entering CANCELLED or
    /// COMPLETED marks the assigned driver available in the same step.
    async fn transition(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<Booking, AppError>;

    /// REQUESTED -> ACCEPTED with `driver_id`, only if still REQUESTED. The
    /// driver is marked unavailable in the same step.
    async fn assign_driver_if_requested(
        &self,
        id: Uuid,
        driver_id: Uuid,
    ) -> Result<Booking, AppError>;

    /// Replaces the notified-driver set. Rejected once the booking left REQUESTED.
    async fn replace_notified_drivers(
        &self,
        id: Uuid,
        driver_ids: &[Uuid],
    ) -> Result<(), AppError>;

    async fn is_driver_notified(&self, id: Uuid, driver_id: Uuid) -> Result<bool, AppError>;

    /// SCHEDULED bookings whose pickup time is at or before `cutoff`.
    async fn due_scheduled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, AppError>;

    async fn pending_for_driver(
        &self,
        driver_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<Booking>, AppError>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn passenger_by_account(&self, account_id: Uuid) -> Result<Passenger, AppError>;

    async fn passenger(&self, id: Uuid) -> Result<Passenger, AppError>;

    async fn driver_by_account(&self, account_id: Uuid) -> Result<Driver, AppError>;

    /// Profiles for the given account ids; unknown ids are skipped.
    async fn drivers_by_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Driver>, AppError>;

    async fn set_driver_availability(
        &self,
        driver_id: Uuid,
        available: bool,
    ) -> Result<Driver, AppError>;

    async fn record_driver_location(
        &self,
        driver_id: Uuid,
        location: GeoPoint,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Stores the review and folds it into the rated party's running average
    /// as one atomic step. A second review by the same role on the same
    /// booking is a `Conflict`.
    async fn submit_review(&self, review: Review) -> Result<RatingSummary, AppError>;
}

#[async_trait]
pub trait OtpIssuer: Send + Sync {
    async fn issue(&self, contact: &str) -> Result<OneTimeCode, AppError>;

    async fn validate(&self, id: Uuid, code: &str) -> bool;
}

#[async_trait]
pub trait Settlement: Send + Sync {
    async fn settle(&self, booking: &Booking) -> Result<Receipt, AppError>;
}
