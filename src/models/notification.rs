use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverNotification {
    pub booking_id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub phone_number: String,
    pub pickup: GeoPoint,
    pub distance_km: f64,
    pub sent_at: DateTime<Utc>,
}
