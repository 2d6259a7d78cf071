//! Common data types used across the telemetry subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity attached to a record. No other values exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Ordering used when sorting by severity.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// One observed network event, as held by the ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Ingestion order, unique and strictly increasing
    pub sequence: u64,
    pub observed_at: DateTime<Utc>,
    pub source_address: String,
    pub destination_address: String,
    /// Open-ended label such as `TCP`, `TLSv1.3` or `QUIC`
    pub protocol_label: String,
    pub size_bytes: u64,
    pub severity: Severity,
    pub info_text: String,
    /// Only ever set on the detail panel's copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

/// Raw telemetry as delivered by a source. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub observed_at: Option<DateTime<Utc>>,
    pub source_address: Option<String>,
    pub destination_address: Option<String>,
    pub protocol: Option<String>,
    pub size_bytes: Option<u64>,
    pub severity: Option<String>,
    pub info: Option<String>,
}

/// A browser resource-timing entry (`PerformanceResourceTiming`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    /// Requested URL
    pub name: String,
    pub initiator_type: String,
    #[serde(default)]
    pub transfer_size: Option<f64>,
    #[serde(default)]
    pub duration_ms: f64,
}

impl ResourceTiming {
    /// Converts the entry into a raw event. The source address is left for
    /// the normalizer, which fills in the local (public) address.
    pub fn into_raw_event(self) -> RawEvent {
        let destination = reqwest::Url::parse(&self.name)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        let protocol = if self.initiator_type == "xmlhttprequest" {
            "HTTP/JSON"
        } else {
            "TLSv1.3"
        };
        let size = self
            .transfer_size
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|s| s.floor() as u64);

        RawEvent {
            observed_at: None,
            source_address: None,
            destination_address: Some(destination),
            protocol: Some(protocol.to_string()),
            size_bytes: size,
            severity: Some("INFO".to_string()),
            info: Some(format!("Application Data [{}ms]", self.duration_ms.round() as i64)),
        }
    }
}
