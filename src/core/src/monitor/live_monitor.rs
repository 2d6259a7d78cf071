use chrono::{DateTime, Utc};
use log::{debug, error, info};

use super::types::{find_interface, CaptureInterface, MonitorStatus};
use crate::configuration::MonitorSettings;
use crate::error_handling::types::MonitorError;
use crate::storage::Storage;
use crate::telemetry::{Normalizer, RawEvent, Record, RingBuffer, SequenceCounter, ViewQuery};

/// Owned store behind the live table: buffer, sequence counter, normalizer
/// and capture controls. Callers share it behind a lock; `tick` does no I/O.
pub struct LiveMonitor {
    buffer: RingBuffer,
    counter: SequenceCounter,
    normalizer: Normalizer,
    interface: CaptureInterface,
    paused: bool,
    // Set once an explicit address (the public IP) replaces the interface's.
    pinned_address: bool,
}

impl LiveMonitor {
    pub fn new(capacity: usize, interface_id: &str) -> Result<Self, MonitorError> {
        let interface = find_interface(interface_id)
            .ok_or_else(|| MonitorError::UnknownInterface(interface_id.to_string()))?;
        Ok(Self {
            buffer: RingBuffer::new(capacity),
            counter: SequenceCounter::new(),
            normalizer: Normalizer::new(interface.address),
            interface,
            paused: false,
            pinned_address: false,
        })
    }

    pub fn from_settings(settings: &MonitorSettings) -> Result<Self, MonitorError> {
        Self::new(settings.capacity, &settings.interface)
    }

    /// Normalizes and appends `events`; returns how many records were added.
    /// A paused monitor drops the events.
    pub fn tick(&mut self, events: Vec<RawEvent>) -> usize {
        if self.paused {
            if !events.is_empty() {
                debug!("Paused, dropping {} event(s)", events.len());
            }
            return 0;
        }
        let count = events.len();
        for raw in events {
            let record = self.normalizer.normalize(raw, &mut self.counter);
            self.buffer.append(record);
        }
        count
    }

    pub fn pause(&mut self) {
        if !self.paused {
            info!("Capture paused");
        }
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            info!("Capture resumed");
        }
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn interface(&self) -> CaptureInterface {
        self.interface
    }

    /// Switches capture to `id` and clears the table. Sequence numbers keep
    /// counting so no number is ever reused. Events without a source take the
    /// new interface's address unless one was pinned.
    pub fn switch_interface(&mut self, id: &str) -> Result<CaptureInterface, MonitorError> {
        let interface =
            find_interface(id).ok_or_else(|| MonitorError::UnknownInterface(id.to_string()))?;
        self.interface = interface;
        if !self.pinned_address {
            self.normalizer.set_local_address(interface.address);
        }
        self.buffer.clear();
        info!("Capture interface switched to {} ({})", interface.id, interface.name);
        Ok(interface)
    }

    /// Address stamped on events that arrive without a source. It survives
    /// interface switches.
    pub fn set_local_address(&mut self, address: &str) {
        self.normalizer.set_local_address(address);
        self.pinned_address = true;
    }

    pub fn snapshot(&self) -> Vec<Record> {
        self.buffer.snapshot()
    }

    pub fn view(&self, query: &ViewQuery) -> Vec<Record> {
        query.apply(&self.buffer.snapshot())
    }

    pub fn find(&self, sequence: u64) -> Result<Record, MonitorError> {
        self.buffer
            .find(sequence)
            .ok_or(MonitorError::RecordNotFound(sequence))
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            paused: self.paused,
            interface: self.interface,
            local_address: self.normalizer.local_address().to_string(),
            capacity: self.buffer.capacity(),
            buffered: self.buffer.len(),
            next_sequence: self.counter.peek(),
        }
    }

    /// The buffered records as a pretty-printed JSON array.
    pub fn export_json(&self) -> Result<String, MonitorError> {
        serde_json::to_string_pretty(&self.buffer.snapshot())
            .map_err(|e| MonitorError::ExportFailed(e.to_string()))
    }
}

pub fn export_key(at: DateTime<Utc>) -> String {
    format!("exports/records-{}.json", at.format("%Y%m%dT%H%M%S%.3fZ"))
}

/// Persists an export produced by [`LiveMonitor::export_json`] and returns
/// its storage key.
pub async fn store_export(storage: &dyn Storage, json: &str) -> Result<String, MonitorError> {
    let key = export_key(Utc::now());
    storage.put(&key, json).await.map_err(|e| {
        error!("Failed to store export {}: {}", key, e);
        MonitorError::ExportFailed(e.to_string())
    })?;
    info!("Exported records to {}", key);
    Ok(key)
}
