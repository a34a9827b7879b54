//! Reading ingestion and history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::error::{ServiceError, ServiceResult};
use crate::domain::Reading;
use crate::repository::{EventRepository, SensorRepository};
use crate::stream::ReadingSource;

pub struct EventService {
    events: Arc<dyn EventRepository>,
    sensors: Arc<dyn SensorRepository>,
}

impl EventService {
    pub fn new(events: Arc<dyn EventRepository>, sensors: Arc<dyn SensorRepository>) -> Self {
        Self { events, sensors }
    }

    /// Record a reading reported by serial number
    ///
    /// Resolves the sensor, stamps the reading with its id, stores it and
    /// updates the sensor's current state. Returns the stored reading, ready
    /// to be published.
    pub async fn receive_event(&self, mut reading: Reading) -> ServiceResult<Reading> {
        if !reading.has_timestamp() {
            return Err(ServiceError::InvalidEventTimestamp);
        }

        let mut sensor = self
            .sensors
            .sensor_by_serial_number(&reading.sensor_serial_number)
            .await
            .map_err(|e| ServiceError::not_found_as(e, ServiceError::SensorNotFound))?;

        reading.sensor_id = sensor.id;
        self.events.save_event(&reading).await?;

        sensor.current_state = reading.payload;
        sensor.last_activity = Utc::now();
        self.sensors.save_sensor(&mut sensor).await?;

        tracing::debug!(
            sensor_id = sensor.id,
            payload = reading.payload,
            "Recorded reading"
        );
        Ok(reading)
    }

    /// The most recent reading recorded for a sensor
    pub async fn latest_reading(&self, sensor_id: i64) -> ServiceResult<Reading> {
        self.events
            .latest_event(sensor_id)
            .await
            .map_err(|e| ServiceError::not_found_as(e, ServiceError::EventNotFound))
    }

    pub async fn sensor_history(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Vec<Reading>> {
        Ok(self.events.history(sensor_id, start, end).await?)
    }
}

#[async_trait]
impl ReadingSource for EventService {
    async fn latest_reading(&self, sensor_id: i64) -> ServiceResult<Reading> {
        EventService::latest_reading(self, sensor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Sensor, SensorType};
    use crate::repository::Repositories;
    use chrono::Duration;

    async fn fixture() -> (EventService, Repositories, Sensor) {
        let repos = Repositories::in_memory();
        let mut sensor = Sensor::new("0123456789", SensorType::Adc, "", true);
        repos.sensors.save_sensor(&mut sensor).await.unwrap();
        let service = EventService::new(repos.events.clone(), repos.sensors.clone());
        (service, repos, sensor)
    }

    #[tokio::test]
    async fn test_receive_event_updates_sensor() {
        let (service, repos, sensor) = fixture().await;

        let stored = service
            .receive_event(Reading::new("0123456789", 42))
            .await
            .unwrap();
        assert_eq!(stored.sensor_id, sensor.id);

        let updated = repos.sensors.sensor_by_id(sensor.id).await.unwrap();
        assert_eq!(updated.current_state, 42);
        assert!(updated.last_activity > sensor.last_activity);

        let latest = service.latest_reading(sensor.id).await.unwrap();
        assert_eq!(latest, stored);
    }

    #[tokio::test]
    async fn test_receive_event_requires_timestamp() {
        let (service, _, _) = fixture().await;
        let reading = Reading::new("0123456789", 1).timestamp(DateTime::<Utc>::default());
        assert!(matches!(
            service.receive_event(reading).await,
            Err(ServiceError::InvalidEventTimestamp)
        ));
    }

    #[tokio::test]
    async fn test_receive_event_unknown_serial() {
        let (service, _, _) = fixture().await;
        assert!(matches!(
            service.receive_event(Reading::new("9999999999", 1)).await,
            Err(ServiceError::SensorNotFound)
        ));
    }

    #[tokio::test]
    async fn test_latest_reading_missing() {
        let (service, _, sensor) = fixture().await;
        let err = service.latest_reading(sensor.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::EventNotFound));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_sensor_history() {
        let (service, _, sensor) = fixture().await;
        let base = Utc::now();
        for i in 1..=3 {
            service
                .receive_event(
                    Reading::new("0123456789", i).timestamp(base + Duration::seconds(i)),
                )
                .await
                .unwrap();
        }

        let history = service
            .sensor_history(sensor.id, base, base + Duration::seconds(3))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }
}
