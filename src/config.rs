//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `SENSORHUB_*` environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::stream::DEFAULT_QUEUE_CAPACITY;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl ServerConfig {
    /// Bind address as `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Streaming delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Per-connection delivery queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delay before a session's one-shot fallback poll (ms)
    #[serde(default = "default_fallback_delay")]
    pub fallback_delay_ms: u64,

    /// How long shutdown waits for sessions to finish (ms)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_fallback_delay() -> u64 {
    200
}

fn default_shutdown_grace() -> u64 {
    2000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            fallback_delay_ms: default_fallback_delay(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

/// Which repository implementation backs the services
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_sqlite_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("sensorhub").join("sensorhub.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./sensorhub.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("sensorhub").join("config.toml")),
            Some(PathBuf::from("/etc/sensorhub/config.toml")),
            Some(PathBuf::from("./sensorhub.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file that parses, else defaults plus environment
    pub fn load_first(config_paths: &[PathBuf]) -> Self {
        for path in config_paths {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup; unparseable values are ignored
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(host) = lookup("SENSORHUB_HOST") {
            self.server.host = host;
        }
        if let Some(p) = lookup("SENSORHUB_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }

        // Storage overrides
        if let Some(backend) = lookup("SENSORHUB_STORAGE_BACKEND") {
            match StorageBackend::parse(&backend) {
                Some(b) => self.storage.backend = b,
                None => tracing::warn!(backend = %backend, "Unknown storage backend, ignoring"),
            }
        }
        if let Some(path) = lookup("SENSORHUB_SQLITE_PATH") {
            self.storage.sqlite_path = path;
        }

        // Stream overrides
        if let Some(c) = lookup("SENSORHUB_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.stream.queue_capacity = c;
        }
        if let Some(d) = lookup("SENSORHUB_FALLBACK_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.stream.fallback_delay_ms = d;
        }

        // Logging overrides
        if let Some(level) = lookup("SENSORHUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SENSORHUB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Sensorhub Configuration
#
# Environment variables override these settings:
# - SENSORHUB_HOST
# - SENSORHUB_PORT
# - SENSORHUB_STORAGE_BACKEND
# - SENSORHUB_SQLITE_PATH
# - SENSORHUB_QUEUE_CAPACITY
# - SENSORHUB_FALLBACK_DELAY_MS
# - SENSORHUB_LOG_LEVEL
# - SENSORHUB_LOG_FORMAT

[server]
# HTTP server host
host = "0.0.0.0"

# HTTP server port
port = 8080

# Allowed CORS origins (empty allows any)
cors_origins = []

[stream]
# Readings buffered per streaming connection before new ones are dropped
queue_capacity = 10

# Delay before a new stream re-sends the latest stored reading (ms)
fallback_delay_ms = 200

# How long shutdown waits for open streams to close (ms)
shutdown_grace_ms = 2000

[storage]
# Storage backend: memory or sqlite
backend = "memory"

# SQLite database file, used when backend = "sqlite"
sqlite_path = "./sensorhub.db"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.stream.queue_capacity, 10);
        assert_eq!(config.stream.fallback_delay_ms, 200);
        assert_eq!(config.stream.shutdown_grace_ms, 2000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.server.addr(), "0.0.0.0:8080");
        assert_eq!(config.stream.queue_capacity, 10);
        assert_eq!(config.storage.sqlite_path, "./sensorhub.db");
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config = Config::parse(
            r#"
            [stream]
            queue_capacity = 3

            [storage]
            backend = "sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.queue_capacity, 3);
        assert_eq!(config.stream.fallback_delay_ms, 200);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Config::parse("[storage]\nbackend = \"postgres\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/nonexistent/sensorhub.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SENSORHUB_HOST", "127.0.0.1"),
            ("SENSORHUB_PORT", "9100"),
            ("SENSORHUB_STORAGE_BACKEND", "SQLite"),
            ("SENSORHUB_SQLITE_PATH", "/tmp/hub.db"),
            ("SENSORHUB_QUEUE_CAPACITY", "32"),
            ("SENSORHUB_FALLBACK_DELAY_MS", "50"),
            ("SENSORHUB_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.addr(), "127.0.0.1:9100");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.sqlite_path, "/tmp/hub.db");
        assert_eq!(config.stream.queue_capacity, 32);
        assert_eq!(config.stream.fallback_delay_ms, 50);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "SENSORHUB_PORT" => Some("not-a-port".to_string()),
            "SENSORHUB_STORAGE_BACKEND" => Some("postgres".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_load_first_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[server\nport = ").unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[server]\nport = 9200").unwrap();
        let missing = dir.path().join("missing.toml");

        let config = Config::load_first(&[missing.clone(), broken.clone(), good]);
        assert_eq!(config.server.port, 9200);

        let config = Config::load_first(&[missing, broken]);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
