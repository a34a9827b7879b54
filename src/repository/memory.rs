//! In-memory repositories
//!
//! Each repository keeps its maps behind a Tokio `RwLock`. Nothing survives a
//! restart; this backend exists for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    EventRepository, RepositoryError, RepositoryResult, SensorOwnerRepository, SensorRepository,
    UserRepository,
};
use crate::domain::{Reading, Sensor, User};

#[derive(Default)]
struct SensorTable {
    by_id: HashMap<i64, Sensor>,
    /// serial number → id
    by_serial: HashMap<String, i64>,
    next_id: i64,
}

/// Sensors indexed by id and serial number
#[derive(Default)]
pub struct MemorySensorRepository {
    table: RwLock<SensorTable>,
}

impl MemorySensorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SensorRepository for MemorySensorRepository {
    async fn save_sensor(&self, sensor: &mut Sensor) -> RepositoryResult<()> {
        let mut table = self.table.write().await;

        if let Some(&owner) = table.by_serial.get(&sensor.serial_number) {
            if owner != sensor.id {
                return Err(RepositoryError::Conflict(format!(
                    "serial number {} already registered",
                    sensor.serial_number
                )));
            }
        }

        if sensor.id == 0 {
            table.next_id += 1;
            sensor.id = table.next_id;
            sensor.registered_at = Utc::now();
        } else {
            let previous = table
                .by_id
                .get(&sensor.id)
                .map(|s| s.serial_number.clone())
                .ok_or_else(|| RepositoryError::NotFound(format!("sensor {}", sensor.id)))?;
            if previous != sensor.serial_number {
                table.by_serial.remove(&previous);
            }
        }

        table.by_serial.insert(sensor.serial_number.clone(), sensor.id);
        table.by_id.insert(sensor.id, sensor.clone());
        Ok(())
    }

    async fn sensors(&self) -> RepositoryResult<Vec<Sensor>> {
        let table = self.table.read().await;
        let mut sensors: Vec<Sensor> = table.by_id.values().cloned().collect();
        sensors.sort_by_key(|s| s.id);
        Ok(sensors)
    }

    async fn sensor_by_id(&self, id: i64) -> RepositoryResult<Sensor> {
        self.table
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("sensor {}", id)))
    }

    async fn sensor_by_serial_number(&self, serial_number: &str) -> RepositoryResult<Sensor> {
        let table = self.table.read().await;
        table
            .by_serial
            .get(serial_number)
            .and_then(|id| table.by_id.get(id))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("sensor {}", serial_number)))
    }
}

/// Readings grouped by sensor id, in insertion order
#[derive(Default)]
pub struct MemoryEventRepository {
    events: RwLock<HashMap<i64, Vec<Reading>>>,
}

impl MemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepository for MemoryEventRepository {
    async fn save_event(&self, reading: &Reading) -> RepositoryResult<()> {
        self.events
            .write()
            .await
            .entry(reading.sensor_id)
            .or_default()
            .push(reading.clone());
        Ok(())
    }

    async fn latest_event(&self, sensor_id: i64) -> RepositoryResult<Reading> {
        let events = self.events.read().await;
        // Insertion order is not timestamp order when clients backdate readings
        events
            .get(&sensor_id)
            .and_then(|readings| readings.iter().max_by_key(|r| r.timestamp))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("events for sensor {}", sensor_id)))
    }

    async fn history(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Reading>> {
        let events = self.events.read().await;
        let mut history: Vec<Reading> = events
            .get(&sensor_id)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| r.timestamp > start && r.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        history.sort_by_key(|r| r.timestamp);
        Ok(history)
    }
}

#[derive(Default)]
struct UserTable {
    by_id: HashMap<i64, User>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryUserRepository {
    table: RwLock<UserTable>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn save_user(&self, user: &mut User) -> RepositoryResult<()> {
        let mut table = self.table.write().await;
        if user.id == 0 {
            table.next_id += 1;
            user.id = table.next_id;
        }
        table.by_id.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_id(&self, id: i64) -> RepositoryResult<User> {
        self.table
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))
    }
}

/// user id → owned sensor ids
#[derive(Default)]
pub struct MemorySensorOwnerRepository {
    owners: RwLock<HashMap<i64, Vec<i64>>>,
}

impl MemorySensorOwnerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SensorOwnerRepository for MemorySensorOwnerRepository {
    async fn attach(&self, user_id: i64, sensor_id: i64) -> RepositoryResult<()> {
        let mut owners = self.owners.write().await;
        let sensors = owners.entry(user_id).or_default();
        if !sensors.contains(&sensor_id) {
            sensors.push(sensor_id);
        }
        Ok(())
    }

    async fn sensors_of(&self, user_id: i64) -> RepositoryResult<Vec<i64>> {
        Ok(self
            .owners
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}
