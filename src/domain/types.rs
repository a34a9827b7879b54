//! Core domain types for the sensor telemetry service
//!
//! - `Reading`: A single timestamped measurement, the unit of distribution
//! - `Sensor`: A registered physical sensor
//! - `User`: An owner of sensors
//! - `SensorType`: Hardware classification whitelist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Required length of a sensor serial number
pub const SERIAL_NUMBER_LEN: usize = 10;

/// A single sensor reading
///
/// Immutable once constructed by the ingestion path. The JSON encoding of this
/// struct is the WebSocket frame payload as well as the history response item,
/// so both paths expose one schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reading {
    /// Wall-clock time of the measurement
    #[serde(with = "rfc3339_nanos")]
    pub timestamp: DateTime<Utc>,
    /// Identifier of the originating sensor (0 until resolved)
    pub sensor_id: i64,
    /// Serial number reported by the device
    pub sensor_serial_number: String,
    /// Observed value
    pub payload: i64,
}

impl Reading {
    /// Create a reading stamped with the current time
    pub fn new(serial_number: impl Into<String>, payload: i64) -> Self {
        Self {
            timestamp: Utc::now(),
            sensor_id: 0,
            sensor_serial_number: serial_number.into(),
            payload,
        }
    }

    /// Builder method: set timestamp
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder method: set the resolved sensor id
    pub fn sensor(mut self, sensor_id: i64) -> Self {
        self.sensor_id = sensor_id;
        self
    }

    /// Whether the timestamp was ever set (the zero value is the Unix epoch)
    pub fn has_timestamp(&self) -> bool {
        self.timestamp != DateTime::<Utc>::default()
    }
}

/// Sensor hardware type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SensorType {
    /// Contact closure
    #[serde(rename = "cc")]
    ContactClosure,
    /// Analog-to-digital converter
    #[serde(rename = "adc")]
    Adc,
}

impl SensorType {
    /// Parse the wire name of a sensor type
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cc" => Some(SensorType::ContactClosure),
            "adc" => Some(SensorType::Adc),
            _ => None,
        }
    }

    /// Wire name of this sensor type
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::ContactClosure => "cc",
            SensorType::Adc => "adc",
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered sensor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sensor {
    /// Storage-assigned identifier (0 before the first save)
    pub id: i64,
    pub serial_number: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    /// Payload of the most recent reading
    pub current_state: i64,
    pub description: String,
    pub is_active: bool,
    #[serde(with = "rfc3339_nanos")]
    pub registered_at: DateTime<Utc>,
    #[serde(with = "rfc3339_nanos")]
    pub last_activity: DateTime<Utc>,
}

impl Sensor {
    /// Create an unsaved sensor
    pub fn new(
        serial_number: impl Into<String>,
        sensor_type: SensorType,
        description: impl Into<String>,
        is_active: bool,
    ) -> Self {
        Self {
            id: 0,
            serial_number: serial_number.into(),
            sensor_type,
            current_state: 0,
            description: description.into(),
            is_active,
            registered_at: DateTime::<Utc>::default(),
            last_activity: DateTime::<Utc>::default(),
        }
    }
}

/// A user who owns sensors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

/// RFC3339 timestamps with fixed nanosecond precision
pub mod rfc3339_nanos {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reading_wire_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let reading = Reading::new("0123456789", 42).timestamp(ts).sensor(7);

        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp":"2024-03-01T12:30:00.000000000Z","sensor_id":7,"sensor_serial_number":"0123456789","payload":42}"#
        );
    }

    #[test]
    fn test_reading_parses_offset_timestamps() {
        let json = r#"{"timestamp":"2024-03-01T15:30:00.5+03:00","sensor_id":1,"sensor_serial_number":"0123456789","payload":-3}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap() + chrono::Duration::milliseconds(500));
        assert_eq!(reading.payload, -3);
    }

    #[test]
    fn test_reading_has_timestamp() {
        assert!(Reading::new("0123456789", 1).has_timestamp());
        let zero = Reading::new("0123456789", 1).timestamp(DateTime::<Utc>::default());
        assert!(!zero.has_timestamp());
    }

    #[test]
    fn test_sensor_type_names() {
        assert_eq!(SensorType::parse("cc"), Some(SensorType::ContactClosure));
        assert_eq!(SensorType::parse("adc"), Some(SensorType::Adc));
        assert_eq!(SensorType::parse("ADC"), None);
        assert_eq!(SensorType::Adc.to_string(), "adc");
    }

    #[test]
    fn test_sensor_serializes_type_field() {
        let sensor = Sensor::new("0123456789", SensorType::Adc, "boiler", true);
        let json = serde_json::to_value(&sensor).unwrap();
        assert_eq!(json["type"], "adc");
        assert_eq!(json["is_active"], true);
    }
}
