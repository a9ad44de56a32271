use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Requested,
    Scheduled,
    Accepted,
    Started,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// A driver reference is held exactly in these states.
    pub fn holds_driver(self) -> bool {
        matches!(
            self,
            BookingStatus::Accepted | BookingStatus::Started | BookingStatus::Completed
        )
    }

    /// Entering these states frees the assigned driver for new matches.
    pub fn releases_driver(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// States a driver may cancel from.
    pub fn is_cancellable(self) -> bool {
        matches!(self, BookingStatus::Requested | BookingStatus::Accepted)
    }

    /// States a passenger may cancel from.
    pub fn is_cancellable_by_passenger(self) -> bool {
        matches!(
            self,
            BookingStatus::Scheduled | BookingStatus::Requested | BookingStatus::Accepted
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BookingStatus::Requested => "REQUESTED",
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::Accepted => "ACCEPTED",
            BookingStatus::Started => "STARTED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: BookingStatus,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub ride_start_code_id: Option<Uuid>,
    /// Drivers offered this ride; only they may accept it.
    pub notified_drivers: BTreeSet<Uuid>,
    pub review_by_passenger: Option<Uuid>,
    pub review_by_driver: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_assigned_to(&self, driver_id: Uuid) -> bool {
        self.driver_id == Some(driver_id)
    }
}

#[cfg(test)]
mod tests {
    use super::BookingStatus;

    #[test]
    fn driver_bearing_states() {
        let holding: Vec<BookingStatus> = [
            BookingStatus::Requested,
            BookingStatus::Scheduled,
            BookingStatus::Accepted,
            BookingStatus::Started,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ]
        .into_iter()
        .filter(|status| status.holds_driver())
        .collect();

        assert_eq!(
            holding,
            vec![
                BookingStatus::Accepted,
                BookingStatus::Started,
                BookingStatus::Completed
            ]
        );
    }

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&BookingStatus::Requested).unwrap();
        assert_eq!(json, "\"REQUESTED\"");
    }
}
