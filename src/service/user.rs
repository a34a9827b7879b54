//! User registration and sensor ownership

use std::sync::Arc;

use super::error::{ServiceError, ServiceResult};
use crate::domain::{Sensor, User};
use crate::repository::{SensorOwnerRepository, SensorRepository, UserRepository};

pub struct UserService {
    users: Arc<dyn UserRepository>,
    owners: Arc<dyn SensorOwnerRepository>,
    sensors: Arc<dyn SensorRepository>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        owners: Arc<dyn SensorOwnerRepository>,
        sensors: Arc<dyn SensorRepository>,
    ) -> Self {
        Self {
            users,
            owners,
            sensors,
        }
    }

    pub async fn register_user(&self, mut user: User) -> ServiceResult<User> {
        if user.name.is_empty() {
            return Err(ServiceError::InvalidUserName);
        }
        self.users.save_user(&mut user).await?;
        tracing::info!(user_id = user.id, "Registered user");
        Ok(user)
    }

    /// Link a sensor to a user; both must exist
    pub async fn attach_sensor(&self, user_id: i64, sensor_id: i64) -> ServiceResult<()> {
        self.user(user_id).await?;
        self.sensors
            .sensor_by_id(sensor_id)
            .await
            .map_err(|e| ServiceError::not_found_as(e, ServiceError::SensorNotFound))?;

        self.owners.attach(user_id, sensor_id).await?;
        tracing::debug!(user_id, sensor_id, "Attached sensor to user");
        Ok(())
    }

    pub async fn user_sensors(&self, user_id: i64) -> ServiceResult<Vec<Sensor>> {
        self.user(user_id).await?;

        let ids = self.owners.sensors_of(user_id).await?;
        let mut sensors = Vec::with_capacity(ids.len());
        for id in ids {
            let sensor = self
                .sensors
                .sensor_by_id(id)
                .await
                .map_err(|e| ServiceError::not_found_as(e, ServiceError::SensorNotFound))?;
            sensors.push(sensor);
        }
        Ok(sensors)
    }

    async fn user(&self, user_id: i64) -> ServiceResult<User> {
        self.users
            .user_by_id(user_id)
            .await
            .map_err(|e| ServiceError::not_found_as(e, ServiceError::UserNotFound))
    }
}
