//! Sensor registration and lookup

use std::sync::Arc;

use super::error::{ServiceError, ServiceResult};
use crate::domain::{Sensor, SERIAL_NUMBER_LEN};
use crate::repository::{RepositoryError, SensorRepository};

pub struct SensorService {
    sensors: Arc<dyn SensorRepository>,
}

impl SensorService {
    pub fn new(sensors: Arc<dyn SensorRepository>) -> Self {
        Self { sensors }
    }

    /// Register a sensor, or return the existing one with the same serial number
    pub async fn register_sensor(&self, mut sensor: Sensor) -> ServiceResult<Sensor> {
        if sensor.serial_number.chars().count() != SERIAL_NUMBER_LEN {
            return Err(ServiceError::WrongSensorSerialNumber);
        }

        match self.sensors.sensor_by_serial_number(&sensor.serial_number).await {
            Ok(existing) => return Ok(existing),
            Err(RepositoryError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        self.sensors.save_sensor(&mut sensor).await?;
        tracing::info!(
            sensor_id = sensor.id,
            serial_number = %sensor.serial_number,
            sensor_type = %sensor.sensor_type,
            "Registered sensor"
        );
        Ok(sensor)
    }

    pub async fn sensors(&self) -> ServiceResult<Vec<Sensor>> {
        Ok(self.sensors.sensors().await?)
    }

    pub async fn sensor_by_id(&self, id: i64) -> ServiceResult<Sensor> {
        self.sensors
            .sensor_by_id(id)
            .await
            .map_err(|e| ServiceError::not_found_as(e, ServiceError::SensorNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SensorType;
    use crate::repository::MemorySensorRepository;

    fn service() -> SensorService {
        SensorService::new(Arc::new(MemorySensorRepository::new()))
    }

    #[tokio::test]
    async fn test_register_sensor() {
        let service = service();
        let sensor = service
            .register_sensor(Sensor::new("0123456789", SensorType::Adc, "boiler", true))
            .await
            .unwrap();
        assert_eq!(sensor.id, 1);
        assert_eq!(service.sensors().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_serial() {
        let service = service();
        let result = service
            .register_sensor(Sensor::new("12345", SensorType::Adc, "", true))
            .await;
        assert!(matches!(result, Err(ServiceError::WrongSensorSerialNumber)));
    }

    #[tokio::test]
    async fn test_register_existing_serial_returns_original() {
        let service = service();
        let first = service
            .register_sensor(Sensor::new("0123456789", SensorType::Adc, "first", true))
            .await
            .unwrap();
        let second = service
            .register_sensor(Sensor::new("0123456789", SensorType::ContactClosure, "second", false))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.description, "first");
    }

    #[tokio::test]
    async fn test_lookup_missing_sensor() {
        let service = service();
        assert!(matches!(
            service.sensor_by_id(7).await,
            Err(ServiceError::SensorNotFound)
        ));
    }
}
