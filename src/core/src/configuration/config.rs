use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

/// Application configuration structure that defines all runtime parameters.
///
/// The configuration is read from a TOML file, every section being optional and
/// falling back to its defaults:
///
/// ```toml
/// [monitor]
/// capacity = 150
/// tick_interval_ms = 1000
/// interface = "eth0"
///
/// [annotation]
/// model = "gemini-3-flash-preview"
/// timeout_secs = 15
/// max_attempts = 2
/// language = "ar"
///
/// [storage]
/// backend = "database"
/// path = "/var/lib/rampart/rampart.sqlite3"
///
/// [web]
/// port = 8080
/// ```
///
/// # Fields Overview
///
/// - `monitor`: ring buffer capacity, ingestion cadence and telemetry sources
/// - `annotation`: generative text service endpoint, timeout and retry policy
/// - `storage`: key-value backend used for sessions, activity logs and exports
/// - `web`: HTTP console binding
/// - `auth`: seed administrator
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorSettings,
    pub annotation: AnnotationSettings,
    pub storage: StorageSettings,
    pub web: WebSettings,
    pub auth: AuthSettings,
}

/// Capacity bounds accepted for the live table.
pub const MIN_CAPACITY: usize = 1;
pub const MAX_CAPACITY: usize = 10_000;

impl Config {
    /// Reads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field constraints the deserializer cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitor = &self.monitor;
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&monitor.capacity) {
            return Err(ConfigError::NotInRange(format!(
                "monitor.capacity must be within {}..={}, got {}",
                MIN_CAPACITY, MAX_CAPACITY, monitor.capacity
            )));
        }
        if monitor.tick_interval_ms == 0 {
            return Err(ConfigError::NotInRange(
                "monitor.tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&monitor.simulated_probability) {
            return Err(ConfigError::NotInRange(format!(
                "monitor.simulated_probability must be within 0.0..=1.0, got {}",
                monitor.simulated_probability
            )));
        }
        if monitor.max_resources_per_tick == 0 {
            return Err(ConfigError::NotInRange(
                "monitor.max_resources_per_tick must be greater than 0".to_string(),
            ));
        }
        if let Some(ref feed) = monitor.resource_feed_path {
            if !feed.is_file() {
                return Err(ConfigError::InvalidValue(format!(
                    "monitor.resource_feed_path {} is not a file",
                    feed.display()
                )));
            }
        }

        let annotation = &self.annotation;
        if annotation.timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "annotation.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if annotation.max_attempts == 0 || annotation.max_attempts > 5 {
            return Err(ConfigError::NotInRange(format!(
                "annotation.max_attempts must be within 1..=5, got {}",
                annotation.max_attempts
            )));
        }
        if annotation.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "annotation.api_key_env must name an environment variable".to_string(),
            ));
        }

        if self.web.enabled && self.web.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "web.bind_address {} is not an IP address",
                self.web.bind_address
            )));
        }

        let storage_dir = match self.storage.backend {
            StorageBackend::File => Some(self.storage.path.as_path()),
            StorageBackend::Database => self.storage.path.parent(),
        };
        if let Some(dir) = storage_dir {
            // Relative or not-yet-created directories are created by the backend.
            if dir.is_absolute() && !dir.exists() {
                let parent_exists = dir.parent().map(|p| p.exists()).unwrap_or(false);
                if !parent_exists {
                    return Err(ConfigError::DirectoryDoesNotExist(dir.display().to_string()));
                }
                warn!("Storage directory {} will be created", dir.display());
            }
        }

        if self.auth.admin_email.trim().is_empty() || self.auth.admin_password.is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.admin_email and auth.admin_password must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Language;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(config, Config::default());
        assert_eq!(config.monitor.capacity, 100);
        assert_eq!(config.annotation.max_attempts, 2);
        assert_eq!(config.annotation.timeout_secs, 15);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [monitor]
            capacity = 150
            interface = "eth0"

            [annotation]
            language = "ar"
            max_attempts = 1

            [storage]
            backend = "database"
            path = "data/rampart.sqlite3"

            [web]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.capacity, 150);
        assert_eq!(config.monitor.interface, "eth0");
        assert_eq!(config.monitor.tick_interval_ms, 1000);
        assert_eq!(config.annotation.language, Language::Ar);
        assert_eq!(config.annotation.max_attempts, 1);
        assert_eq!(config.storage.backend, StorageBackend::Database);
        assert_eq!(config.storage.path, PathBuf::from("data/rampart.sqlite3"));
        assert!(!config.web.enabled);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Config::from_toml_str("[monitor]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
    }

    #[test]
    fn probability_out_of_range_is_rejected() {
        let err = Config::from_toml_str("[monitor]\nsimulated_probability = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = Config::from_toml_str("[annotation]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = Config::from_toml_str("[monitor\ncapacity = ").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn missing_storage_parent_is_rejected() {
        let err = Config::from_toml_str(
            "[storage]\nbackend = \"file\"\npath = \"/nonexistent-rampart/deeper/store\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DirectoryDoesNotExist(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[web]\nport = 9090").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.web.port, 9090);
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let err = Config::from_file(Path::new("/nonexistent/rampart.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
