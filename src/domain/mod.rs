//! Domain model
//!
//! Plain data types shared by storage, services and the streaming core.

pub mod types;

pub use types::{rfc3339_nanos, Reading, Sensor, SensorType, User, SERIAL_NUMBER_LEN};
