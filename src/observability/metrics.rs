use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_created_total: IntCounterVec,
    pub dispatch_publish_total: IntCounterVec,
    pub matching_runs_total: IntCounterVec,
    pub matching_latency_seconds: HistogramVec,
    pub notifications_sent_total: IntCounter,
    pub tracked_drivers: IntGauge,
    pub scheduled_activations_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_created_total = IntCounterVec::new(
            Opts::new("bookings_created_total", "Bookings created by initial status"),
            &["status"],
        )
        .expect("valid bookings_created_total metric");

        let dispatch_publish_total = IntCounterVec::new(
            Opts::new(
                "dispatch_publish_total",
                "Dispatch topic publishes by outcome",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_publish_total metric");

        let matching_runs_total = IntCounterVec::new(
            Opts::new("matching_runs_total", "Driver matching runs by outcome"),
            &["outcome"],
        )
        .expect("valid matching_runs_total metric");

        let matching_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "matching_latency_seconds",
                "Latency of a driver matching run in seconds",
            ),
            &["outcome"],
        )
        .expect("valid matching_latency_seconds metric");

        let notifications_sent_total = IntCounter::new(
            "notifications_sent_total",
            "Driver ride offers pushed",
        )
        .expect("valid notifications_sent_total metric");

        let tracked_drivers = IntGauge::new(
            "tracked_drivers",
            "Drivers currently held in the location index",
        )
        .expect("valid tracked_drivers metric");

        let scheduled_activations_total = IntCounterVec::new(
            Opts::new(
                "scheduled_activations_total",
                "Scheduled bookings promoted to dispatch by outcome",
            ),
            &["outcome"],
        )
        .expect("valid scheduled_activations_total metric");

        registry
            .register(Box::new(bookings_created_total.clone()))
            .expect("register bookings_created_total");
        registry
            .register(Box::new(dispatch_publish_total.clone()))
            .expect("register dispatch_publish_total");
        registry
            .register(Box::new(matching_runs_total.clone()))
            .expect("register matching_runs_total");
        registry
            .register(Box::new(matching_latency_seconds.clone()))
            .expect("register matching_latency_seconds");
        registry
            .register(Box::new(notifications_sent_total.clone()))
            .expect("register notifications_sent_total");
        registry
            .register(Box::new(tracked_drivers.clone()))
            .expect("register tracked_drivers");
        registry
            .register(Box::new(scheduled_activations_total.clone()))
            .expect("register scheduled_activations_total");

        Self {
            registry,
            bookings_created_total,
            dispatch_publish_total,
            matching_runs_total,
            matching_latency_seconds,
            notifications_sent_total,
            tracked_drivers,
            scheduled_activations_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
