use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::{EventBus, TOPIC_DRIVER_MATCHING};
use crate::error::BusError;
use crate::observability::metrics::Metrics;

/// Payload of the driver matching topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub booking_id: Uuid,
    /// 0 for the first dispatch, incremented by each no-match retry.
    #[serde(default)]
    pub attempt: u32,
}

impl DispatchEvent {
    pub fn new(booking_id: Uuid) -> Self {
        Self {
            booking_id,
            attempt: 0,
        }
    }

    pub fn retry(self) -> Self {
        Self {
            booking_id: self.booking_id,
            attempt: self.attempt + 1,
        }
    }
}

/// Publishes dispatch events under a deadline.
pub struct DispatchPublisher {
    bus: Arc<EventBus>,
    timeout: Duration,
    metrics: Metrics,
}

impl DispatchPublisher {
    pub fn new(bus: Arc<EventBus>, timeout: Duration, metrics: Metrics) -> Self {
        Self {
            bus,
            timeout,
            metrics,
        }
    }

    /// Fails with [`BusError::TimedOut`] once the deadline passes, or
    /// [`BusError::Cancelled`] when `cancel` fires first.
    pub async fn publish(
        &self,
        event: DispatchEvent,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        let message = serde_json::to_value(event)?;

        let result = match tokio::time::timeout(
            self.timeout,
            self.bus.publish(TOPIC_DRIVER_MATCHING, message, cancel),
        )
        .await
        {
            Ok(published) => published,
            Err(_) => Err(BusError::TimedOut {
                topic: TOPIC_DRIVER_MATCHING.to_string(),
            }),
        };

        let outcome = match &result {
            Ok(()) => "published",
            Err(BusError::Cancelled { .. }) => "cancelled",
            Err(BusError::TimedOut { .. }) => "timed_out",
            Err(BusError::Encode(_)) => "encode_error",
        };
        self.metrics
            .dispatch_publish_total
            .with_label_values(&[outcome])
            .inc();

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use super::{DispatchEvent, DispatchPublisher};
    use crate::bus::{EventBus, TOPIC_DRIVER_MATCHING};
    use crate::error::BusError;
    use crate::observability::metrics::Metrics;

    #[tokio::test]
    async fn publishes_json_event() {
        let bus = Arc::new(EventBus::new(4));
        let publisher = DispatchPublisher::new(bus.clone(), Duration::from_secs(1), Metrics::new());
        let booking_id = Uuid::new_v4();

        publisher
            .publish(DispatchEvent::new(booking_id), &CancellationToken::new())
            .await
            .unwrap();

        let message = bus.subscribe(TOPIC_DRIVER_MATCHING).recv().await.unwrap();
        assert_eq!(message, json!({ "booking_id": booking_id, "attempt": 0 }));
    }

    #[tokio::test]
    async fn full_topic_times_out() {
        let bus = Arc::new(EventBus::new(1));
        let publisher =
            DispatchPublisher::new(bus.clone(), Duration::from_millis(20), Metrics::new());
        let token = CancellationToken::new();

        publisher
            .publish(DispatchEvent::new(Uuid::new_v4()), &token)
            .await
            .unwrap();
        let err = publisher
            .publish(DispatchEvent::new(Uuid::new_v4()), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, BusError::TimedOut { .. }));
    }

    #[test]
    fn attempt_defaults_to_zero() {
        let id = Uuid::new_v4();
        let event: DispatchEvent = serde_json::from_value(json!({ "booking_id": id })).unwrap();
        assert_eq!(event, DispatchEvent::new(id));
        assert_eq!(event.retry().attempt, 1);
    }
}
