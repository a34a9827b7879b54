//! Event Routes
//!
//! - POST /events - Ingest a reading and publish it to open streams
//! - GET /sensors/:sensor_id/events - WebSocket stream of a sensor's readings

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::api::dto::EventRequest;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::IdPath;
use crate::api::state::AppState;
use crate::domain::Reading;
use crate::stream;

/// POST /events
///
/// Stores the reading, then hands it to the broker. Publishing never fails
/// the request: slow streams simply miss the reading.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EventRequest>,
) -> ApiResult<StatusCode> {
    let reading = state
        .events
        .receive_event(Reading::new(req.sensor_serial_number, req.payload))
        .await?;

    let sensor_id = reading.sensor_id;
    let outcome = state.hub.publish(sensor_id, reading);
    tracing::debug!(
        sensor_id,
        delivered = outcome.delivered,
        dropped = outcome.dropped,
        "Published reading"
    );

    Ok(StatusCode::CREATED)
}

/// GET /sensors/:sensor_id/events
///
/// The sensor must exist before the upgrade is accepted.
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    IdPath(sensor_id): IdPath,
    ws: Option<WebSocketUpgrade>,
) -> ApiResult<Response> {
    state.sensors.sensor_by_id(sensor_id).await?;

    let ws = ws.ok_or_else(|| ApiError::BadRequest("WebSocket upgrade required".into()))?;
    let hub = Arc::clone(&state.hub);
    Ok(ws.on_upgrade(move |socket| async move {
        let connection_id = stream::accept(&hub, socket, sensor_id);
        tracing::debug!(connection_id = %connection_id, sensor_id, "Stream accepted");
    }))
}
