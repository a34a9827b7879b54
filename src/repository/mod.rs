//! Storage layer
//!
//! Narrow async repository traits over sensors, users, ownership links and
//! recorded readings, with two interchangeable backends:
//!
//! - **memory**: `tokio::sync::RwLock`-guarded maps, lost on restart
//! - **sqlite**: a single `rusqlite` connection in WAL mode
//!
//! Services only ever see the trait objects bundled in [`Repositories`].

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{RepositoryError, RepositoryResult};
pub use memory::{
    MemoryEventRepository, MemorySensorOwnerRepository, MemorySensorRepository,
    MemoryUserRepository,
};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::{Reading, Sensor, User};

/// Sensor persistence
#[async_trait]
pub trait SensorRepository: Send + Sync {
    /// Insert a sensor when `id == 0` (assigning `id` and `registered_at`),
    /// otherwise overwrite the stored record
    async fn save_sensor(&self, sensor: &mut Sensor) -> RepositoryResult<()>;

    /// All sensors ordered by id
    async fn sensors(&self) -> RepositoryResult<Vec<Sensor>>;

    async fn sensor_by_id(&self, id: i64) -> RepositoryResult<Sensor>;

    async fn sensor_by_serial_number(&self, serial_number: &str) -> RepositoryResult<Sensor>;
}

/// Reading persistence
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn save_event(&self, reading: &Reading) -> RepositoryResult<()>;

    /// The reading with the greatest timestamp for a sensor
    async fn latest_event(&self, sensor_id: i64) -> RepositoryResult<Reading>;

    /// Readings strictly inside `(start, end)`, oldest first
    async fn history(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Reading>>;
}

/// User persistence
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user, assigning its id
    async fn save_user(&self, user: &mut User) -> RepositoryResult<()>;

    async fn user_by_id(&self, id: i64) -> RepositoryResult<User>;
}

/// User → sensor ownership links
#[async_trait]
pub trait SensorOwnerRepository: Send + Sync {
    /// Record that `user_id` owns `sensor_id` (idempotent)
    async fn attach(&self, user_id: i64, sensor_id: i64) -> RepositoryResult<()>;

    /// Sensor ids owned by a user, in attach order
    async fn sensors_of(&self, user_id: i64) -> RepositoryResult<Vec<i64>>;
}

/// The full set of repositories for one backend
#[derive(Clone)]
pub struct Repositories {
    pub sensors: Arc<dyn SensorRepository>,
    pub events: Arc<dyn EventRepository>,
    pub users: Arc<dyn UserRepository>,
    pub owners: Arc<dyn SensorOwnerRepository>,
}

impl Repositories {
    /// Volatile in-memory repositories
    pub fn in_memory() -> Self {
        Self {
            sensors: Arc::new(MemorySensorRepository::new()),
            events: Arc::new(MemoryEventRepository::new()),
            users: Arc::new(MemoryUserRepository::new()),
            owners: Arc::new(MemorySensorOwnerRepository::new()),
        }
    }

    /// Repositories backed by one SQLite database file
    pub fn sqlite(path: &Path) -> RepositoryResult<Self> {
        let store = Arc::new(SqliteStore::open(path)?);
        Ok(Self {
            sensors: store.clone(),
            events: store.clone(),
            users: store.clone(),
            owners: store,
        })
    }

    /// Build the repositories selected by configuration
    pub fn from_config(config: &StorageConfig) -> RepositoryResult<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::Sqlite => Self::sqlite(Path::new(&config.sqlite_path)),
        }
    }
}
