use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::Subscription;
use crate::config::DispatchConfig;
use crate::engine::dispatch::{DispatchEvent, DispatchPublisher};
use crate::engine::filters::{DriverCandidate, FilterChain, MatchRequest};
use crate::engine::location::LocationIndex;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::booking::BookingStatus;
use crate::models::notification::DriverNotification;
use crate::observability::metrics::Metrics;
use crate::store::{BookingStore, Directory};

/// What to do when a run ends with nobody to notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchPolicy {
    /// Leave the booking without dispatch until someone retries it.
    Drop,
    /// Re-publish after `backoff`, at most `max_attempts` times.
    Retry { max_attempts: u32, backoff: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Notified(Vec<Uuid>),
    NoCandidates,
    /// The booking left REQUESTED before matching ran.
    Skipped(BookingStatus),
}

impl MatchOutcome {
    fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Notified(_) => "notified",
            MatchOutcome::NoCandidates => "no_candidates",
            MatchOutcome::Skipped(_) => "skipped",
        }
    }
}

pub struct DriverMatcher {
    bookings: Arc<dyn BookingStore>,
    directory: Arc<dyn Directory>,
    locations: Arc<LocationIndex>,
    dispatch: Arc<DispatchPublisher>,
    filters: FilterChain,
    notifications_tx: broadcast::Sender<DriverNotification>,
    metrics: Metrics,
    search_radius_km: f64,
    run_timeout: Duration,
    no_match_policy: NoMatchPolicy,
}

impl DriverMatcher {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        directory: Arc<dyn Directory>,
        locations: Arc<LocationIndex>,
        dispatch: Arc<DispatchPublisher>,
        notifications_tx: broadcast::Sender<DriverNotification>,
        metrics: Metrics,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            bookings,
            directory,
            locations,
            dispatch,
            filters: FilterChain::standard(config.max_pickup_distance_km),
            notifications_tx,
            metrics,
            search_radius_km: config.search_radius_km,
            run_timeout: config.matching_timeout,
            no_match_policy: config.no_match_policy,
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Consumes dispatch events until `shutdown` fires.
    pub async fn run(self: Arc<Self>, subscription: Subscription, shutdown: CancellationToken) {
        info!(topic = subscription.topic(), "driver matching started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(message) => message,
                    None => {
                        warn!(topic = subscription.topic(), "dispatch topic closed");
                        break;
                    }
                },
            };

            let event: DispatchEvent = match serde_json::from_value(message.clone()) {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, message = %message, "discarding malformed dispatch message");
                    self.metrics
                        .matching_runs_total
                        .with_label_values(&["malformed"])
                        .inc();
                    continue;
                }
            };

            self.process(event, &shutdown).await;
        }

        info!("driver matching stopped");
    }

    async fn process(&self, event: DispatchEvent, shutdown: &CancellationToken) {
        let start = Instant::now();
        let result = tokio::time::timeout(self.run_timeout, self.match_booking(event.booking_id)).await;

        let label = match result {
            Ok(Ok(outcome)) => {
                if outcome == MatchOutcome::NoCandidates {
                    self.on_no_match(event, shutdown);
                }
                outcome.label()
            }
            Ok(Err(err)) => {
                error!(booking_id = %event.booking_id, error = %err, "driver matching failed");
                "error"
            }
            Err(_) => {
                error!(
                    booking_id = %event.booking_id,
                    timeout_ms = self.run_timeout.as_millis() as u64,
                    "driver matching timed out"
                );
                "timed_out"
            }
        };

        self.metrics
            .matching_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .matching_runs_total
            .with_label_values(&[label])
            .inc();
    }

    /// One matching run: search, resolve, filter, record the allow-list, notify.
    pub async fn match_booking(&self, booking_id: Uuid) -> Result<MatchOutcome, AppError> {
        info!(booking_id = %booking_id, "handling driver matching");

        let booking = self.bookings.get(booking_id).await?;
        if booking.status != BookingStatus::Requested {
            info!(booking_id = %booking_id, status = %booking.status, "booking no longer requested; skipping");
            return Ok(MatchOutcome::Skipped(booking.status));
        }

        let nearby = self
            .locations
            .nearby_drivers(&booking.pickup, self.search_radius_km);
        if nearby.is_empty() {
            info!(booking_id = %booking_id, "no drivers nearby");
            return Ok(MatchOutcome::NoCandidates);
        }

        let profiles = self.directory.drivers_by_accounts(&nearby).await?;
        let candidates: Vec<DriverCandidate> = profiles
            .iter()
            .filter_map(|driver| {
                let location = self.locations.location_of(driver.account_id)?;
                Some(DriverCandidate::from_profile(driver, location))
            })
            .collect();

        let passenger = self.directory.passenger(booking.passenger_id).await?;
        let request = MatchRequest {
            booking_id,
            pickup: booking.pickup,
            passenger_gender: passenger.gender,
        };

        let found = candidates.len();
        let eligible = self.filters.apply(candidates, &request);
        if eligible.is_empty() {
            info!(booking_id = %booking_id, found, "no matching drivers after filtering");
            return Ok(MatchOutcome::NoCandidates);
        }

        let driver_ids: Vec<Uuid> = eligible.iter().map(|c| c.driver_id).collect();
        self.bookings
            .replace_notified_drivers(booking_id, &driver_ids)
            .await?;

        info!(
            booking_id = %booking_id,
            found,
            notified = eligible.len(),
            "found matching drivers; notifying"
        );
        for candidate in &eligible {
            self.notify(&request, candidate);
        }

        Ok(MatchOutcome::Notified(driver_ids))
    }

    fn notify(&self, request: &MatchRequest, candidate: &DriverCandidate) {
        let notification = DriverNotification {
            booking_id: request.booking_id,
            driver_id: candidate.driver_id,
            driver_name: candidate.name.clone(),
            phone_number: candidate.phone_number.clone(),
            pickup: request.pickup,
            distance_km: haversine_km(&request.pickup, &candidate.location),
            sent_at: Utc::now(),
        };

        info!(
            booking_id = %notification.booking_id,
            driver_id = %notification.driver_id,
            driver_name = %notification.driver_name,
            distance_km = notification.distance_km,
            ">> push notification sent"
        );

        // No live receivers is fine; the log line above is the delivery record.
        let _ = self.notifications_tx.send(notification);
        self.metrics.notifications_sent_total.inc();
    }

    fn on_no_match(&self, event: DispatchEvent, shutdown: &CancellationToken) {
        let (max_attempts, backoff) = match self.no_match_policy {
            NoMatchPolicy::Drop => {
                info!(booking_id = %event.booking_id, "booking left without dispatch");
                return;
            }
            NoMatchPolicy::Retry {
                max_attempts,
                backoff,
            } => (max_attempts, backoff),
        };

        if event.attempt >= max_attempts {
            warn!(
                booking_id = %event.booking_id,
                attempts = event.attempt,
                "giving up on matching after retries"
            );
            return;
        }

        let next = event.retry();
        let dispatch = self.dispatch.clone();
        let shutdown = shutdown.clone();
        debug!(booking_id = %next.booking_id, attempt = next.attempt, "scheduling matching retry");

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            if let Err(err) = dispatch.publish(next, &shutdown).await {
                error!(booking_id = %next.booking_id, error = %err, "failed to re-publish booking for matching");
            }
        });
    }
}
