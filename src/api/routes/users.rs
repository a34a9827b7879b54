//! User Routes
//!
//! - POST /users - Register a user
//! - GET /users/:user_id/sensors - Sensors owned by a user
//! - POST /users/:user_id/sensors - Attach a sensor to a user

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{CreateUserRequest, SensorBindingRequest};
use crate::api::error::ApiResult;
use crate::api::extract::{AcceptsJson, IdPath};
use crate::api::state::AppState;
use crate::domain::{Sensor, User};

/// POST /users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<User>> {
    let user = state.users.register_user(User::new(req.name)).await?;
    Ok(Json(user))
}

/// GET /users/:user_id/sensors
pub async fn list_user_sensors(
    State(state): State<Arc<AppState>>,
    IdPath(user_id): IdPath,
    _: AcceptsJson,
) -> ApiResult<Json<Vec<Sensor>>> {
    let sensors = state.users.user_sensors(user_id).await?;
    Ok(Json(sensors))
}

/// POST /users/:user_id/sensors
///
/// Returns 404 for an unknown user or sensor.
pub async fn attach_sensor(
    State(state): State<Arc<AppState>>,
    IdPath(user_id): IdPath,
    Json(req): Json<SensorBindingRequest>,
) -> ApiResult<StatusCode> {
    state.users.attach_sensor(user_id, req.sensor_id).await?;
    Ok(StatusCode::CREATED)
}
