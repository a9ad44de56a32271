use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short-lived code the passenger hands to the driver to start the ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub id: Uuid,
    pub code: String,
    pub sent_to: String,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
