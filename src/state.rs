use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::{EventBus, TOPIC_DRIVER_MATCHING};
use crate::config::DispatchConfig;
use crate::engine::booking::BookingService;
use crate::engine::dispatch::DispatchPublisher;
use crate::engine::drivers::DriverService;
use crate::engine::location::LocationIndex;
use crate::engine::matching::DriverMatcher;
use crate::engine::scheduler::Scheduler;
use crate::models::notification::DriverNotification;
use crate::observability::metrics::Metrics;
use crate::otp::InMemoryOtpIssuer;
use crate::store::{Collaborators, InMemoryLedger, InMemoryStore, OtpIssuer};

pub struct AppState {
    pub store: Arc<InMemoryStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub locations: Arc<LocationIndex>,
    pub bus: Arc<EventBus>,
    pub bookings: Arc<BookingService>,
    pub drivers: Arc<DriverService>,
    pub matcher: Arc<DriverMatcher>,
    pub scheduler: Arc<Scheduler>,
    pub notifications_tx: broadcast::Sender<DriverNotification>,
    pub metrics: Metrics,
    /// Fires on process shutdown; in-flight publishes observe it too.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &DispatchConfig) -> Self {
        Self::with_otp_issuer(config, Arc::new(InMemoryOtpIssuer::new(config.ride_code_ttl)))
    }

    pub fn with_otp_issuer(config: &DispatchConfig, otp: Arc<dyn OtpIssuer>) -> Self {
        let metrics = Metrics::new();
        let store = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let locations = Arc::new(LocationIndex::new());
        let bus = Arc::new(EventBus::new(config.topic_capacity));
        let (notifications_tx, _unused_rx) = broadcast::channel(config.notification_buffer_size);

        let dispatch = Arc::new(DispatchPublisher::new(
            bus.clone(),
            config.publish_timeout,
            metrics.clone(),
        ));

        let collaborators = Collaborators {
            bookings: store.clone(),
            directory: store.clone(),
            reviews: store.clone(),
            otp,
            settlement: ledger.clone(),
        };

        let bookings = Arc::new(BookingService::new(
            collaborators,
            dispatch.clone(),
            metrics.clone(),
            config.schedule_lookahead,
        ));
        let drivers = Arc::new(DriverService::new(
            store.clone(),
            locations.clone(),
            metrics.clone(),
        ));
        let matcher = Arc::new(DriverMatcher::new(
            store.clone(),
            store.clone(),
            locations.clone(),
            dispatch.clone(),
            notifications_tx.clone(),
            metrics.clone(),
            config,
        ));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            dispatch,
            metrics.clone(),
            config.scheduler_interval,
            config.activation_window,
        ));

        Self {
            store,
            ledger,
            locations,
            bus,
            bookings,
            drivers,
            matcher,
            scheduler,
            notifications_tx,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawns the matching consumer and the scheduling ticker.
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let subscription = self.bus.subscribe(TOPIC_DRIVER_MATCHING);
        let handles = vec![
            tokio::spawn(self.matcher.clone().run(subscription, self.shutdown.clone())),
            tokio::spawn(self.scheduler.clone().run(self.shutdown.clone())),
        ];

        BackgroundTasks {
            token: self.shutdown.clone(),
            handles,
        }
    }
}

pub struct BackgroundTasks {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Cancels the shared token and waits for every task to return.
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "background task panicked");
            }
        }
        info!("background tasks stopped");
    }
}
