//! # Sensorhub
//!
//! Sensor telemetry service: devices report readings over HTTP, readings are
//! stored, and every open stream for that sensor receives them in near-real
//! time over WebSocket.
//!
//! ## Modules
//!
//! - [`domain`]: readings, sensors and users
//! - [`repository`]: storage traits with in-memory and SQLite backends
//! - [`service`]: validation and ingestion workflows
//! - [`stream`]: broker, streaming sessions and shutdown coordination
//! - [`api`]: REST and WebSocket routes with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensorhub::stream::{Broker, ConnectionId};
//! use sensorhub::Reading;
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = Broker::new(10);
//!     let queue = broker.subscribe(ConnectionId::new(), 7);
//!
//!     broker.publish(7, Reading::new("0123456789", 42).sensor(7));
//!
//!     let reading = queue.recv().await.unwrap();
//!     println!("sensor {} reported {}", reading.sensor_id, reading.payload);
//! }
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod logging;
pub mod repository;
pub mod service;
pub mod stream;

// Re-export top-level types for convenience
pub use domain::{Reading, Sensor, SensorType, User};

pub use repository::{RepositoryError, RepositoryResult, Repositories};

pub use service::{EventService, SensorService, ServiceError, ServiceResult, UserService};

pub use stream::{Broker, ConnectionId, HubConfig, PublishOutcome, Session, StreamHub};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError};
