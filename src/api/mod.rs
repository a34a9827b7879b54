//! Sensorhub REST API
//!
//! HTTP API layer, built with Axum.
//!
//! # Endpoints
//!
//! ## Users
//! - `POST /users` - Register a user
//! - `GET /users/:user_id/sensors` - Sensors owned by a user
//! - `POST /users/:user_id/sensors` - Attach a sensor to a user
//!
//! ## Sensors
//! - `GET /sensors` - List all sensors
//! - `POST /sensors` - Register a sensor
//! - `GET /sensors/:sensor_id` - Get a sensor
//! - `GET /sensors/:sensor_id/history` - Readings between two RFC3339 dates
//!
//! ## Events
//! - `POST /events` - Ingest a reading
//! - `GET /sensors/:sensor_id/events` - WebSocket stream of new readings
//!
//! `OPTIONS` on the REST routes answers 204 with an `Allow` header. JSON
//! `GET` endpoints return 406 when `Accept` rules out `application/json`, and
//! a non-numeric id in the path is a 422.
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use sensorhub::api::{serve, AppState};
//! use sensorhub::config::Config;
//! use sensorhub::repository::Repositories;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let state = AppState::new(&Repositories::in_memory(), &config.stream);
//!     let hub = state.hub.clone();
//!
//!     serve(state, &config.server).await?;
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use extract::allow;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    Router::new()
        // User routes
        .route(
            "/users",
            post(routes::users::create_user).options(|| async { allow("POST,OPTIONS") }),
        )
        .route(
            "/users/:user_id/sensors",
            get(routes::users::list_user_sensors)
                .post(routes::users::attach_sensor)
                .options(|| async { allow("GET,POST,HEAD,OPTIONS") }),
        )
        // Sensor routes
        .route(
            "/sensors",
            get(routes::sensors::list_sensors)
                .post(routes::sensors::create_sensor)
                .options(|| async { allow("GET,POST,HEAD,OPTIONS") }),
        )
        .route(
            "/sensors/:sensor_id",
            get(routes::sensors::get_sensor).options(|| async { allow("GET,HEAD,OPTIONS") }),
        )
        .route(
            "/sensors/:sensor_id/history",
            get(routes::sensors::sensor_history),
        )
        // Event routes
        .route(
            "/events",
            post(routes::events::ingest_event).options(|| async { allow("POST,OPTIONS") }),
        )
        .route("/sensors/:sensor_id/events", get(routes::events::stream_events))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// CORS policy: any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
///
/// When the shutdown signal arrives, stream sessions are told to stop before
/// the listener drains.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let hub = Arc::clone(&state.hub);
    let router = build_router(state).layer(cors_layer(&config.cors_origins));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Sensorhub API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            hub.begin_shutdown();
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Sensorhub API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
