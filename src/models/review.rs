use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the ride wrote the review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewerRole {
    Passenger,
    Driver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RatedParty {
    Driver(Uuid),
    Passenger(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub author: ReviewerRole,
    pub rated: RatedParty,
    pub rating: u8,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub rating_count: u32,
}

impl RatingSummary {
    pub fn with_rating(self, rating: u8) -> Self {
        let count = self.rating_count + 1;
        let average =
            (self.average_rating * self.rating_count as f64 + rating as f64) / count as f64;
        Self {
            average_rating: average,
            rating_count: count,
        }
    }
}
