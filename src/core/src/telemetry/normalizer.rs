//! Conversion of raw telemetry into uniform records.
//!
//! Normalization never fails: missing fields are replaced by the defaults
//! below so that a malformed event cannot stall the ingestion timer.

use chrono::Utc;
use log::trace;

use super::types::{RawEvent, Record, Severity};

pub const DEFAULT_LOCAL_ADDRESS: &str = "192.168.1.15";
pub const DEFAULT_DESTINATION_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PROTOCOL_LABEL: &str = "Unknown";
pub const DEFAULT_SIZE_BYTES: u64 = 0;
pub const DEFAULT_SEVERITY: Severity = Severity::Info;

/// Source of record sequence numbers, owned by whoever owns the buffer.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// Value the next record will receive.
    pub fn peek(&self) -> u64 {
        self.next
    }

    fn take(&mut self) -> u64 {
        let current = self.next;
        self.next += 1;
        current
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    local_address: String,
}

impl Normalizer {
    pub fn new<S: Into<String>>(local_address: S) -> Self {
        Self {
            local_address: local_address.into(),
        }
    }

    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// Replaces the address used for events without a source (e.g. after
    /// the public IP lookup resolved).
    pub fn set_local_address<S: Into<String>>(&mut self, address: S) {
        self.local_address = address.into();
    }

    /// Builds a record from `raw`, stamping it with the counter's current
    /// value and advancing the counter by one.
    pub fn normalize(&self, raw: RawEvent, counter: &mut SequenceCounter) -> Record {
        let severity = raw
            .severity
            .as_deref()
            .and_then(|s| s.parse::<Severity>().ok())
            .unwrap_or(DEFAULT_SEVERITY);

        let record = Record {
            sequence: counter.take(),
            observed_at: raw.observed_at.unwrap_or_else(Utc::now),
            source_address: non_blank(raw.source_address)
                .unwrap_or_else(|| self.local_address.clone()),
            destination_address: non_blank(raw.destination_address)
                .unwrap_or_else(|| DEFAULT_DESTINATION_ADDRESS.to_string()),
            protocol_label: non_blank(raw.protocol)
                .unwrap_or_else(|| DEFAULT_PROTOCOL_LABEL.to_string()),
            size_bytes: raw.size_bytes.unwrap_or(DEFAULT_SIZE_BYTES),
            severity,
            info_text: raw.info.unwrap_or_default(),
            annotation: None,
        };
        trace!(
            "normalized #{} {} -> {} {}",
            record.sequence,
            record.source_address,
            record.destination_address,
            record.protocol_label
        );
        record
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_ADDRESS)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
