use serde::Deserialize;
use std::path::PathBuf;

use crate::annotation::Language;

/// Live table ingestion settings.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Maximum number of records retained by the ring buffer
    pub capacity: usize,
    /// Period of the ingestion timer
    pub tick_interval_ms: u64,
    /// Capture interface selected at startup (`wlan0`, `eth0` or `tun0`)
    pub interface: String,
    /// Chance, per tick, that the simulated source emits a TCP control event
    pub simulated_probability: f64,
    /// Optional JSON file of resource-timing entries fed to the table
    pub resource_feed_path: Option<PathBuf>,
    /// Upper bound of resource-timing entries taken per tick
    pub max_resources_per_tick: usize,
    /// Fetch the public address from ipify at startup
    pub lookup_public_ip: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            tick_interval_ms: 1000,
            interface: String::from("wlan0"),
            simulated_probability: 0.4,
            resource_feed_path: None,
            max_resources_per_tick: 3,
            lookup_public_ip: false,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct AnnotationSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Per-attempt timeout
    pub timeout_secs: u64,
    /// Total attempts, the first call included
    pub max_attempts: u32,
    pub language: Language,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://generativelanguage.googleapis.com/v1beta"),
            model: String::from("gemini-3-flash-preview"),
            api_key_env: String::from("API_KEY"),
            timeout_secs: 15,
            max_attempts: 2,
            language: Language::En,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Database,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Directory for the file backend, database file for the SQLite backend
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("rampart-data"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: String::from("127.0.0.1"),
            port: 8080,
        }
    }
}

/// Seed administrator account created when the user registry is empty.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_department: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            admin_name: String::from("Administrator"),
            admin_email: String::from("admin@rampart.local"),
            admin_password: String::from("admin@123"),
            admin_department: Some(String::from("Cyber Defense Command")),
        }
    }
}
