use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::dispatch::{DispatchEvent, DispatchPublisher};
use crate::error::AppError;
use crate::models::booking::BookingStatus;
use crate::observability::metrics::Metrics;
use crate::store::BookingStore;

/// Outcome counts of one activation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub activated: usize,
    /// Promoted to REQUESTED but the dispatch publish failed.
    pub undispatched: usize,
    pub failed: usize,
}

/// Promotes SCHEDULED bookings to REQUESTED as their pickup time nears.
pub struct Scheduler {
    bookings: Arc<dyn BookingStore>,
    dispatch: Arc<DispatchPublisher>,
    metrics: Metrics,
    period: Duration,
    window: chrono::Duration,
}

impl Scheduler {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        dispatch: Arc<DispatchPublisher>,
        metrics: Metrics,
        period: Duration,
        window: Duration,
    ) -> Self {
        Self {
            bookings,
            dispatch,
            metrics,
            period,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::minutes(15)),
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "scheduler started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.activate_due(Utc::now(), &shutdown).await {
                        Ok(report) if report != ActivationReport::default() => {
                            info!(
                                activated = report.activated,
                                undispatched = report.undispatched,
                                failed = report.failed,
                                "scheduled bookings processed"
                            );
                        }
                        Ok(_) => debug!("no scheduled bookings due"),
                        Err(err) => error!(error = %err, "failed to load due scheduled bookings"),
                    }
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Activates every SCHEDULED booking due within the window after `now`.
    /// Each booking is moved to REQUESTED before it is published, so a
    /// matching run never sees it still SCHEDULED.
    pub async fn activate_due(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ActivationReport, AppError> {
        let due = self.bookings.due_scheduled(now + self.window).await?;
        let mut report = ActivationReport::default();

        for booking in due {
            if let Err(err) = self
                .bookings
                .transition(booking.id, BookingStatus::Scheduled, BookingStatus::Requested)
                .await
            {
                warn!(booking_id = %booking.id, error = %err, "failed to activate scheduled booking");
                self.record(&mut report, Activation::Failed);
                continue;
            }

            match self.dispatch.publish(DispatchEvent::new(booking.id), cancel).await {
                Ok(()) => {
                    info!(
                        booking_id = %booking.id,
                        scheduled_for = ?booking.scheduled_for,
                        "scheduled booking activated"
                    );
                    self.record(&mut report, Activation::Activated);
                }
                Err(err) => {
                    error!(
                        booking_id = %booking.id,
                        error = %err,
                        "scheduled booking is REQUESTED but was not dispatched"
                    );
                    self.record(&mut report, Activation::Undispatched);
                }
            }
        }

        Ok(report)
    }

    fn record(&self, report: &mut ActivationReport, activation: Activation) {
        let outcome = match activation {
            Activation::Activated => {
                report.activated += 1;
                "activated"
            }
            Activation::Undispatched => {
                report.undispatched += 1;
                "undispatched"
            }
            Activation::Failed => {
                report.failed += 1;
                "failed"
            }
        };
        self.metrics
            .scheduled_activations_total
            .with_label_values(&[outcome])
            .inc();
    }
}

enum Activation {
    Activated,
    Undispatched,
    Failed,
}
