//! SQLite-backed repositories
//!
//! One connection serves all four repository traits. Timestamps are stored
//! as integer nanoseconds since the Unix epoch so range scans use the
//! `(sensor_id, timestamp)` index directly.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{
    EventRepository, RepositoryError, RepositoryResult, SensorOwnerRepository, SensorRepository,
    UserRepository,
};
use crate::domain::{Reading, Sensor, SensorType, User};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sensors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        serial_number TEXT NOT NULL UNIQUE,
        type TEXT NOT NULL,
        current_state INTEGER NOT NULL,
        description TEXT NOT NULL,
        is_active INTEGER NOT NULL,
        registered_at INTEGER NOT NULL,
        last_activity INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sensor_id INTEGER NOT NULL,
        sensor_serial_number TEXT NOT NULL,
        payload INTEGER NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_sensor_time ON events(sensor_id, timestamp);
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sensors_users (
        user_id INTEGER NOT NULL,
        sensor_id INTEGER NOT NULL,
        PRIMARY KEY (user_id, sensor_id)
    );
";

const SENSOR_COLUMNS: &str =
    "id, serial_number, type, current_state, description, is_active, registered_at, last_activity";

/// SQLite store implementing every repository trait
pub struct SqliteStore {
    /// std::sync::Mutex because rusqlite::Connection is !Sync
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database at `path` and apply the schema
    pub fn open(path: &Path) -> RepositoryResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // journal_mode returns a row, so it cannot go through execute_batch
        let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = ?path, "Opened SQLite store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::Lock(format!("Failed to acquire connection lock: {}", e)))
    }
}

fn to_nanos(ts: &DateTime<Utc>) -> RepositoryResult<i64> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| RepositoryError::Corruption(format!("timestamp out of range: {}", ts)))
}

/// Query bound in nanoseconds, saturating outside chrono's nanosecond range
fn bound_nanos(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Raw column values of a sensor row
struct SensorRow {
    id: i64,
    serial_number: String,
    sensor_type: String,
    current_state: i64,
    description: String,
    is_active: bool,
    registered_at: i64,
    last_activity: i64,
}

impl SensorRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            serial_number: row.get(1)?,
            sensor_type: row.get(2)?,
            current_state: row.get(3)?,
            description: row.get(4)?,
            is_active: row.get(5)?,
            registered_at: row.get(6)?,
            last_activity: row.get(7)?,
        })
    }

    fn into_sensor(self) -> RepositoryResult<Sensor> {
        let sensor_type = SensorType::parse(&self.sensor_type).ok_or_else(|| {
            RepositoryError::Corruption(format!(
                "sensor {} has unknown type {:?}",
                self.id, self.sensor_type
            ))
        })?;

        Ok(Sensor {
            id: self.id,
            serial_number: self.serial_number,
            sensor_type,
            current_state: self.current_state,
            description: self.description,
            is_active: self.is_active,
            registered_at: from_nanos(self.registered_at),
            last_activity: from_nanos(self.last_activity),
        })
    }
}

fn reading_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        sensor_id: row.get(0)?,
        sensor_serial_number: row.get(1)?,
        payload: row.get(2)?,
        timestamp: from_nanos(row.get(3)?),
    })
}

#[async_trait]
impl SensorRepository for SqliteStore {
    async fn save_sensor(&self, sensor: &mut Sensor) -> RepositoryResult<()> {
        let conn = self.conn()?;

        if sensor.id == 0 {
            let registered_at = Utc::now();
            conn.execute(
                "INSERT INTO sensors (serial_number, type, current_state, description, is_active, registered_at, last_activity)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    sensor.serial_number,
                    sensor.sensor_type.as_str(),
                    sensor.current_state,
                    sensor.description,
                    sensor.is_active,
                    to_nanos(&registered_at)?,
                    to_nanos(&sensor.last_activity)?,
                ],
            )?;
            sensor.id = conn.last_insert_rowid();
            sensor.registered_at = registered_at;
            return Ok(());
        }

        let updated = conn.execute(
            "UPDATE sensors
             SET serial_number = ?, type = ?, current_state = ?, description = ?,
                 is_active = ?, registered_at = ?, last_activity = ?
             WHERE id = ?",
            params![
                sensor.serial_number,
                sensor.sensor_type.as_str(),
                sensor.current_state,
                sensor.description,
                sensor.is_active,
                to_nanos(&sensor.registered_at)?,
                to_nanos(&sensor.last_activity)?,
                sensor.id,
            ],
        )?;

        if updated == 0 {
            return Err(RepositoryError::NotFound(format!("sensor {}", sensor.id)));
        }
        Ok(())
    }

    async fn sensors(&self) -> RepositoryResult<Vec<Sensor>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {} FROM sensors ORDER BY id", SENSOR_COLUMNS))?;
        let rows = stmt
            .query_map([], SensorRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SensorRow::into_sensor).collect()
    }

    async fn sensor_by_id(&self, id: i64) -> RepositoryResult<Sensor> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM sensors WHERE id = ?", SENSOR_COLUMNS),
            params![id],
            SensorRow::from_row,
        )
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("sensor {}", id)))?
        .into_sensor()
    }

    async fn sensor_by_serial_number(&self, serial_number: &str) -> RepositoryResult<Sensor> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM sensors WHERE serial_number = ?", SENSOR_COLUMNS),
            params![serial_number],
            SensorRow::from_row,
        )
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("sensor {}", serial_number)))?
        .into_sensor()
    }
}

#[async_trait]
impl EventRepository for SqliteStore {
    async fn save_event(&self, reading: &Reading) -> RepositoryResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO events (sensor_id, sensor_serial_number, payload, timestamp)
             VALUES (?, ?, ?, ?)",
            params![
                reading.sensor_id,
                reading.sensor_serial_number,
                reading.payload,
                to_nanos(&reading.timestamp)?,
            ],
        )?;
        Ok(())
    }

    async fn latest_event(&self, sensor_id: i64) -> RepositoryResult<Reading> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT sensor_id, sensor_serial_number, payload, timestamp FROM events
             WHERE sensor_id = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT 1",
            params![sensor_id],
            reading_from_row,
        )
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("events for sensor {}", sensor_id)))
    }

    async fn history(
        &self,
        sensor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Reading>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT sensor_id, sensor_serial_number, payload, timestamp FROM events
             WHERE sensor_id = ? AND timestamp > ? AND timestamp < ?
             ORDER BY timestamp, id",
        )?;
        let readings = stmt
            .query_map(
                params![sensor_id, bound_nanos(&start), bound_nanos(&end)],
                reading_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(readings)
    }
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn save_user(&self, user: &mut User) -> RepositoryResult<()> {
        let conn = self.conn()?;
        if user.id == 0 {
            conn.execute("INSERT INTO users (name) VALUES (?)", params![user.name])?;
            user.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "INSERT OR REPLACE INTO users (id, name) VALUES (?, ?)",
                params![user.id, user.name],
            )?;
        }
        Ok(())
    }

    async fn user_by_id(&self, id: i64) -> RepositoryResult<User> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name FROM users WHERE id = ?",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))
    }
}

#[async_trait]
impl SensorOwnerRepository for SqliteStore {
    async fn attach(&self, user_id: i64, sensor_id: i64) -> RepositoryResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO sensors_users (user_id, sensor_id) VALUES (?, ?)",
            params![user_id, sensor_id],
        )?;
        Ok(())
    }

    async fn sensors_of(&self, user_id: i64) -> RepositoryResult<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT sensor_id FROM sensors_users WHERE user_id = ? ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rfc3339_nanos;
    use chrono::Duration;
    use tempfile::tempdir;

    fn open_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("sensorhub.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_sensor_round_trip() {
        let (store, _dir) = open_store();

        let mut sensor = Sensor::new("0123456789", SensorType::ContactClosure, "door", true);
        store.save_sensor(&mut sensor).await.unwrap();
        assert_eq!(sensor.id, 1);

        let loaded = store.sensor_by_serial_number("0123456789").await.unwrap();
        assert_eq!(loaded, sensor);

        sensor.current_state = 1;
        sensor.last_activity = Utc::now();
        store.save_sensor(&mut sensor).await.unwrap();
        let loaded = store.sensor_by_id(sensor.id).await.unwrap();
        assert_eq!(loaded.current_state, 1);
        assert_eq!(loaded.last_activity, sensor.last_activity);
    }

    #[tokio::test]
    async fn test_duplicate_serial_is_conflict() {
        let (store, _dir) = open_store();
        let mut a = Sensor::new("0123456789", SensorType::Adc, "", true);
        let mut b = Sensor::new("0123456789", SensorType::Adc, "", true);
        store.save_sensor(&mut a).await.unwrap();
        assert!(matches!(
            store.save_sensor(&mut b).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let (store, _dir) = open_store();
        assert!(matches!(
            store.sensor_by_id(42).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            store.user_by_id(42).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            store.latest_event(42).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_events_latest_and_history() {
        let (store, _dir) = open_store();
        let base = Utc::now();

        for i in 0..5 {
            let reading = Reading::new("0123456789", i)
                .timestamp(base + Duration::seconds(i))
                .sensor(3);
            store.save_event(&reading).await.unwrap();
        }
        let backdated = Reading::new("0123456789", 100)
            .timestamp(base - Duration::seconds(30))
            .sensor(3);
        store.save_event(&backdated).await.unwrap();

        let latest = store.latest_event(3).await.unwrap();
        assert_eq!(latest.payload, 4);
        assert_eq!(latest.timestamp, base + Duration::seconds(4));

        let history = store
            .history(3, base, base + Duration::seconds(3))
            .await
            .unwrap();
        let payloads: Vec<i64> = history.iter().map(|r| r.payload).collect();
        assert_eq!(payloads, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_history_window_beyond_nanosecond_range() {
        let (store, _dir) = open_store();
        store
            .save_event(&Reading::new("0123456789", 7).sensor(1))
            .await
            .unwrap();

        let start = rfc3339_nanos::parse("1000-01-01T00:00:00Z").unwrap();
        let end = rfc3339_nanos::parse("3000-01-01T00:00:00Z").unwrap();
        let history = store.history(1, start, end).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload, 7);

        let before = rfc3339_nanos::parse("1500-01-01T00:00:00Z").unwrap();
        assert!(store.history(1, start, before).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owners_are_idempotent() {
        let (store, _dir) = open_store();
        let mut user = User::new("bob");
        store.save_user(&mut user).await.unwrap();

        store.attach(user.id, 2).await.unwrap();
        store.attach(user.id, 2).await.unwrap();
        store.attach(user.id, 1).await.unwrap();

        assert_eq!(store.sensors_of(user.id).await.unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("sensorhub.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            let mut sensor = Sensor::new("0123456789", SensorType::Adc, "", true);
            store.save_sensor(&mut sensor).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.sensors().await.unwrap().len(), 1);
        assert_eq!(store.path(), path.as_path());
    }
}
