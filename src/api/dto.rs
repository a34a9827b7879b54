//! Data Transfer Objects
//!
//! Request and response types for the API endpoints. Domain types
//! (`User`, `Sensor`, `Reading`) serialize directly as responses.

use serde::{Deserialize, Serialize};

// ============================================
// USER DTOs
// ============================================

/// POST /users body
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

/// POST /users/:user_id/sensors body
#[derive(Debug, Deserialize)]
pub struct SensorBindingRequest {
    pub sensor_id: i64,
}

// ============================================
// SENSOR DTOs
// ============================================

/// POST /sensors body
#[derive(Debug, Deserialize)]
pub struct CreateSensorRequest {
    pub serial_number: String,
    /// Sensor type wire name ("cc" or "adc")
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

// ============================================
// EVENT DTOs
// ============================================

/// POST /events body; the timestamp is assigned on receipt
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub sensor_serial_number: String,
    pub payload: i64,
}

/// GET /sensors/:sensor_id/history query
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// RFC3339 lower bound (exclusive)
    pub start_date: String,
    /// RFC3339 upper bound (exclusive)
    pub end_date: String,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    /// Open streaming connections
    pub active_streams: usize,
}
