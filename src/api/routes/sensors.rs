//! Sensor Routes
//!
//! - GET /sensors - List all sensors
//! - POST /sensors - Register a sensor
//! - GET /sensors/:sensor_id - Get a sensor
//! - GET /sensors/:sensor_id/history - Readings in a time window

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{CreateSensorRequest, HistoryParams};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{AcceptsJson, IdPath};
use crate::api::state::AppState;
use crate::domain::{rfc3339_nanos, Reading, Sensor, SensorType};
use crate::service::ServiceError;

/// GET /sensors
pub async fn list_sensors(
    State(state): State<Arc<AppState>>,
    _: AcceptsJson,
) -> ApiResult<Json<Vec<Sensor>>> {
    Ok(Json(state.sensors.sensors().await?))
}

/// POST /sensors
///
/// Registering a serial number that already exists returns that sensor.
pub async fn create_sensor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSensorRequest>,
) -> ApiResult<Json<Sensor>> {
    let sensor_type = SensorType::parse(&req.sensor_type)
        .ok_or_else(|| ServiceError::WrongSensorType(req.sensor_type.clone()))?;

    let sensor = state
        .sensors
        .register_sensor(Sensor::new(
            req.serial_number,
            sensor_type,
            req.description,
            req.is_active,
        ))
        .await?;
    Ok(Json(sensor))
}

/// GET /sensors/:sensor_id
pub async fn get_sensor(
    State(state): State<Arc<AppState>>,
    IdPath(sensor_id): IdPath,
    _: AcceptsJson,
) -> ApiResult<Json<Sensor>> {
    Ok(Json(state.sensors.sensor_by_id(sensor_id).await?))
}

/// GET /sensors/:sensor_id/history?start_date=..&end_date=..
pub async fn sensor_history(
    State(state): State<Arc<AppState>>,
    IdPath(sensor_id): IdPath,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<Reading>>> {
    let start = parse_date("start_date", &params.start_date)?;
    let end = parse_date("end_date", &params.end_date)?;

    state.sensors.sensor_by_id(sensor_id).await?;
    let history = state.events.sensor_history(sensor_id, start, end).await?;
    Ok(Json(history))
}

fn parse_date(field: &str, raw: &str) -> ApiResult<chrono::DateTime<chrono::Utc>> {
    rfc3339_nanos::parse(raw)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {}: {}", field, e)))
}
