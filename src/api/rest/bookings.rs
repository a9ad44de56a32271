use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::identity::CallerId;
use crate::engine::booking::{CreateBookingRequest, CreatedBooking};
use crate::error::AppError;
use crate::models::booking::Booking;
use crate::models::review::RatingSummary;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/rate", post(rate_ride))
}

#[derive(Deserialize)]
pub struct RateRideRequest {
    pub rating: i32,
    #[serde(default)]
    pub note: String,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    let created = state
        .bookings
        .create_booking(account_id, payload, &state.shutdown)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(account_id, id).await?))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .cancel_booking_as_passenger(account_id, id)
        .await?;
    Ok(Json(booking))
}

async fn rate_ride(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateRideRequest>,
) -> Result<Json<RatingSummary>, AppError> {
    let summary = state
        .bookings
        .rate_ride_as(account_id, id, payload.rating, payload.note)
        .await?;
    Ok(Json(summary))
}
