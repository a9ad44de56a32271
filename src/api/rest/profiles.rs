use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::identity::CallerId;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::gender::Gender;
use crate::models::passenger::Passenger;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/passengers", post(create_passenger))
        .route("/drivers", post(create_driver))
}

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub gender: Option<Gender>,
}

impl CreateProfileRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidInput("name cannot be empty".to_string()));
        }
        if self.phone_number.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "phone_number cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

async fn create_passenger(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Passenger>), AppError> {
    payload.validate()?;
    let passenger = state.store.register_passenger(
        account_id,
        payload.name,
        payload.phone_number,
        payload.gender,
    )?;
    Ok((StatusCode::CREATED, Json(passenger)))
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    CallerId(account_id): CallerId,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    payload.validate()?;
    let driver = state.store.register_driver(
        account_id,
        payload.name,
        payload.phone_number,
        payload.gender,
    )?;
    Ok((StatusCode::CREATED, Json(driver)))
}
