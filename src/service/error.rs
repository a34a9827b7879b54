//! Service error types

use thiserror::Error;

use crate::domain::SERIAL_NUMBER_LEN;
use crate::repository::RepositoryError;

/// Domain rule violations and lookup failures
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown sensor type: {0}")]
    WrongSensorType(String),

    #[error("Serial number must be exactly {} characters", SERIAL_NUMBER_LEN)]
    WrongSensorSerialNumber,

    #[error("User name cannot be empty")]
    InvalidUserName,

    #[error("Event timestamp is not set")]
    InvalidEventTimestamp,

    #[error("Sensor not found")]
    SensorNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("No events recorded for sensor")]
    EventNotFound,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// Map a repository `NotFound` onto a domain-specific variant
    pub(crate) fn not_found_as(err: RepositoryError, not_found: ServiceError) -> ServiceError {
        match err {
            RepositoryError::NotFound(_) => not_found,
            other => ServiceError::Repository(other),
        }
    }

    /// Whether this error means "nothing there" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::SensorNotFound | ServiceError::UserNotFound | ServiceError::EventNotFound
        )
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
