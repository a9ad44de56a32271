use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::dispatch::{DispatchEvent, DispatchPublisher};
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::Driver;
use crate::models::location::GeoPoint;
use crate::models::page::PageRequest;
use crate::models::receipt::Receipt;
use crate::models::review::{RatedParty, RatingSummary, Review, ReviewerRole};
use crate::observability::metrics::Metrics;
use crate::store::Collaborators;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBooking {
    pub booking: Booking,
    /// Handed to the passenger, who reads it out to the driver at pickup.
    pub ride_start_code: String,
    pub code_expires_at: DateTime<Utc>,
    /// False when the booking was stored but the dispatch publish failed.
    pub dispatched: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedRide {
    pub booking: Booking,
    pub receipt: Option<Receipt>,
}

/// The booking state machine. Every transition goes through a status
/// compare-and-set on the booking store.
pub struct BookingService {
    store: Collaborators,
    dispatch: Arc<DispatchPublisher>,
    metrics: Metrics,
    schedule_lookahead: chrono::Duration,
}

impl BookingService {
    pub fn new(
        store: Collaborators,
        dispatch: Arc<DispatchPublisher>,
        metrics: Metrics,
        schedule_lookahead: Duration,
    ) -> Self {
        Self {
            store,
            dispatch,
            metrics,
            schedule_lookahead: chrono::Duration::from_std(schedule_lookahead)
                .unwrap_or(chrono::Duration::minutes(20)),
        }
    }

    /// Stores the booking, then publishes it for matching when it is due now.
    /// A failed publish never fails the creation.
    pub async fn create_booking(
        &self,
        passenger_account: Uuid,
        request: CreateBookingRequest,
        cancel: &CancellationToken,
    ) -> Result<CreatedBooking, AppError> {
        request.pickup.validate()?;
        request.dropoff.validate()?;

        let passenger = self
            .store
            .directory
            .passenger_by_account(passenger_account)
            .await?;

        let now = Utc::now();
        let status = match request.scheduled_for {
            Some(at) if at > now + self.schedule_lookahead => BookingStatus::Scheduled,
            _ => BookingStatus::Requested,
        };

        let code = self.store.otp.issue(&passenger.phone_number).await?;

        let booking = self
            .store
            .bookings
            .create(Booking {
                id: Uuid::new_v4(),
                passenger_id: passenger.id,
                driver_id: None,
                status,
                pickup: request.pickup,
                dropoff: request.dropoff,
                scheduled_for: request.scheduled_for,
                ride_start_code_id: Some(code.id),
                notified_drivers: BTreeSet::new(),
                review_by_passenger: None,
                review_by_driver: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.metrics
            .bookings_created_total
            .with_label_values(&[&status.to_string()])
            .inc();
        info!(
            booking_id = %booking.id,
            passenger_id = %passenger.id,
            status = %status,
            "booking created"
        );

        let dispatched = if status == BookingStatus::Requested {
            match self
                .dispatch
                .publish(DispatchEvent::new(booking.id), cancel)
                .await
            {
                Ok(()) => true,
                Err(err) => {
                    error!(
                        booking_id = %booking.id,
                        error = %err,
                        "booking stored but dispatch publish failed"
                    );
                    false
                }
            }
        } else {
            false
        };

        Ok(CreatedBooking {
            booking,
            ride_start_code: code.code,
            code_expires_at: code.expires_at,
            dispatched,
        })
    }

    pub async fn accept_booking(
        &self,
        driver_account: Uuid,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        let driver = self.store.directory.driver_by_account(driver_account).await?;

        if !self
            .store
            .bookings
            .is_driver_notified(booking_id, driver.id)
            .await?
        {
            return Err(AppError::Unauthorized(format!(
                "driver {} was not offered booking {booking_id}",
                driver.id
            )));
        }

        let booking = self
            .store
            .bookings
            .assign_driver_if_requested(booking_id, driver.id)
            .await
            .map_err(|err| match err {
                AppError::Conflict(_) => {
                    AppError::Conflict(format!("booking {booking_id} is no longer available"))
                }
                other => other,
            })?;

        info!(booking_id = %booking_id, driver_id = %driver.id, "booking accepted");
        Ok(booking)
    }

    /// Driver-side cancel. The booking is not re-dispatched.
    pub async fn cancel_booking(
        &self,
        driver_account: Uuid,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        let (driver, booking) = self.assigned_booking(driver_account, booking_id).await?;
        if !booking.status.is_cancellable() {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} cannot be cancelled while {}",
                booking.status
            )));
        }

        let cancelled = self
            .store
            .bookings
            .transition(booking_id, booking.status, BookingStatus::Cancelled)
            .await?;

        info!(booking_id = %booking_id, driver_id = %driver.id, "booking cancelled by driver");
        Ok(cancelled)
    }

    pub async fn cancel_booking_as_passenger(
        &self,
        passenger_account: Uuid,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        let passenger = self
            .store
            .directory
            .passenger_by_account(passenger_account)
            .await?;
        let booking = self.store.bookings.get(booking_id).await?;

        if booking.passenger_id != passenger.id {
            return Err(AppError::Unauthorized(format!(
                "booking {booking_id} belongs to another passenger"
            )));
        }
        if !booking.status.is_cancellable_by_passenger() {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} cannot be cancelled while {}",
                booking.status
            )));
        }

        let cancelled = self
            .store
            .bookings
            .transition(booking_id, booking.status, BookingStatus::Cancelled)
            .await?;

        info!(booking_id = %booking_id, passenger_id = %passenger.id, "booking cancelled by passenger");
        Ok(cancelled)
    }

    pub async fn start_ride(
        &self,
        driver_account: Uuid,
        booking_id: Uuid,
        code: &str,
    ) -> Result<Booking, AppError> {
        let (driver, booking) = self.assigned_booking(driver_account, booking_id).await?;
        if booking.status != BookingStatus::Accepted {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} cannot start while {}",
                booking.status
            )));
        }

        let code = code.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::InvalidInput(
                "ride start code must be numeric".to_string(),
            ));
        }

        let code_id = booking.ride_start_code_id.ok_or(AppError::InvalidCode)?;
        if !self.store.otp.validate(code_id, code).await {
            warn!(booking_id = %booking_id, driver_id = %driver.id, "ride start code rejected");
            return Err(AppError::InvalidCode);
        }

        let started = self
            .store
            .bookings
            .transition(booking_id, BookingStatus::Accepted, BookingStatus::Started)
            .await?;

        info!(booking_id = %booking_id, driver_id = %driver.id, "ride started");
        Ok(started)
    }

    /// Completes the ride and frees the driver. Settlement failures are
    /// logged and leave the ride completed.
    pub async fn end_ride(
        &self,
        driver_account: Uuid,
        booking_id: Uuid,
    ) -> Result<CompletedRide, AppError> {
        let (driver, booking) = self.assigned_booking(driver_account, booking_id).await?;
        if booking.status != BookingStatus::Started {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} cannot end while {}",
                booking.status
            )));
        }

        let completed = self
            .store
            .bookings
            .transition(booking_id, BookingStatus::Started, BookingStatus::Completed)
            .await?;

        let receipt = match self.store.settlement.settle(&completed).await {
            Ok(receipt) => {
                info!(
                    booking_id = %booking_id,
                    amount = receipt.amount,
                    currency = %receipt.currency,
                    "ride settled"
                );
                Some(receipt)
            }
            Err(err) => {
                error!(booking_id = %booking_id, error = %err, "ride settlement failed");
                None
            }
        };

        info!(booking_id = %booking_id, driver_id = %driver.id, "ride completed");
        Ok(CompletedRide {
            booking: completed,
            receipt,
        })
    }

    /// The passenger rates the driver, or the driver rates the passenger.
    pub async fn rate_ride(
        &self,
        booking_id: Uuid,
        rating: i32,
        note: String,
        as_passenger: bool,
    ) -> Result<RatingSummary, AppError> {
        let booking = self.store.bookings.get(booking_id).await?;
        if booking.status != BookingStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} cannot be rated while {}",
                booking.status
            )));
        }
        let rating = u8::try_from(rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| {
                AppError::InvalidInput(format!("rating {rating} must be between 1 and 5"))
            })?;

        let driver_id = booking.driver_id.ok_or_else(|| {
            AppError::Internal(format!("completed booking {booking_id} has no driver"))
        })?;
        let (author, rated) = if as_passenger {
            (ReviewerRole::Passenger, RatedParty::Driver(driver_id))
        } else {
            (ReviewerRole::Driver, RatedParty::Passenger(booking.passenger_id))
        };

        let summary = self
            .store
            .reviews
            .submit_review(Review {
                id: Uuid::new_v4(),
                booking_id,
                author,
                rated,
                rating,
                note,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            booking_id = %booking_id,
            author = ?author,
            rating,
            average_rating = summary.average_rating,
            "ride rated"
        );
        Ok(summary)
    }

    pub async fn rate_ride_as(
        &self,
        caller_account: Uuid,
        booking_id: Uuid,
        rating: i32,
        note: String,
    ) -> Result<RatingSummary, AppError> {
        let booking = self.store.bookings.get(booking_id).await?;
        let role = self.role_of(caller_account, &booking).await?;
        self.rate_ride(booking_id, rating, note, role == ReviewerRole::Passenger)
            .await
    }

    /// Visible to the owning passenger and the assigned driver.
    pub async fn get_booking(
        &self,
        caller_account: Uuid,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        let booking = self.store.bookings.get(booking_id).await?;
        self.role_of(caller_account, &booking).await?;
        Ok(booking)
    }

    pub async fn pending_rides(
        &self,
        driver_account: Uuid,
        page: PageRequest,
    ) -> Result<Vec<Booking>, AppError> {
        let driver = self.store.directory.driver_by_account(driver_account).await?;
        self.store.bookings.pending_for_driver(driver.id, page).await
    }

    async fn assigned_booking(
        &self,
        driver_account: Uuid,
        booking_id: Uuid,
    ) -> Result<(Driver, Booking), AppError> {
        let driver = self.store.directory.driver_by_account(driver_account).await?;
        let booking = self.store.bookings.get(booking_id).await?;

        if !booking.is_assigned_to(driver.id) {
            return Err(AppError::Unauthorized(format!(
                "driver {} is not assigned to booking {booking_id}",
                driver.id
            )));
        }
        Ok((driver, booking))
    }

    async fn role_of(
        &self,
        caller_account: Uuid,
        booking: &Booking,
    ) -> Result<ReviewerRole, AppError> {
        if let Ok(passenger) = self
            .store
            .directory
            .passenger_by_account(caller_account)
            .await
        {
            if passenger.id == booking.passenger_id {
                return Ok(ReviewerRole::Passenger);
            }
        }
        if let Ok(driver) = self.store.directory.driver_by_account(caller_account).await {
            if booking.is_assigned_to(driver.id) {
                return Ok(ReviewerRole::Driver);
            }
        }

        Err(AppError::Unauthorized(format!(
            "account {caller_account} is not a party to booking {}",
            booking.id
        )))
    }
}
