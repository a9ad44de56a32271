use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::gender::Gender;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub gender: Option<Gender>,
    pub average_rating: f64,
    pub rating_count: u32,
    pub created_at: DateTime<Utc>,
}
