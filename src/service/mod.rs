//! Domain services
//!
//! Validation rules and multi-repository workflows used by the HTTP routes:
//!
//! - **SensorService**: sensor registration (serial number rules) and lookup
//! - **UserService**: users and sensor ownership
//! - **EventService**: reading ingestion, latest reading, history

pub mod error;
pub mod event;
pub mod sensor;
pub mod user;

pub use error::{ServiceError, ServiceResult};
pub use event::EventService;
pub use sensor::SensorService;
pub use user::UserService;
