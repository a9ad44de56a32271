use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::identity::CallerId;
use crate::engine::booking::CompletedRide;
use crate::error::AppError;
use crate::models::booking::Booking;
use crate::models::driver::Driver;
use crate::models::location::GeoPoint;
use crate::models::page::PageRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/bookings/pending", get(pending_rides))
        .route("/driver/bookings/:id/accept", post(accept_booking))
        .route("/driver/bookings/:id/cancel", post(cancel_booking))
        .route("/driver/bookings/:id/start", post(start_ride))
        .route("/driver/bookings/:id/end", post(end_ride))
        .route("/driver/location", put(update_location))
        .route("/driver/availability", put(update_availability))
}

#[derive(Deserialize)]
pub struct StartRideRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize)]
pub struct LocationResponse {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available: bool,
}

async fn pending_rides(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Query(page): Query<PageRequest>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.pending_rides(account_id, page).await?))
}

async fn accept_booking(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.accept_booking(account_id, id).await?))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.cancel_booking(account_id, id).await?))
}

async fn start_ride(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartRideRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .start_ride(account_id, id, &payload.code)
        .await?;
    Ok(Json(booking))
}

async fn end_ride(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletedRide>, AppError> {
    Ok(Json(state.bookings.end_ride(account_id, id).await?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<LocationResponse>, AppError> {
    let location = state
        .drivers
        .update_location(account_id, payload.lat, payload.lng)
        .await?;
    Ok(Json(LocationResponse { location }))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .set_availability(account_id, payload.available)
        .await?;
    Ok(Json(driver))
}
