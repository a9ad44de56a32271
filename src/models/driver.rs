use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::gender::Gender;
use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub gender: Option<Gender>,
    pub is_available: bool,
    pub average_rating: f64,
    pub rating_count: u32,
    pub last_known_location: Option<GeoPoint>,
    pub updated_at: DateTime<Utc>,
}
