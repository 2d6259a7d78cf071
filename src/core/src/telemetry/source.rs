//! Telemetry sources polled once per ingestion tick.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::{RawEvent, ResourceTiming};

/// A feed of raw events. `poll` returns whatever arrived since the last call,
/// possibly nothing.
pub trait TelemetrySource: Send {
    fn name(&self) -> &str;
    fn poll(&mut self) -> Vec<RawEvent>;
}

/// Emits a TCP control event on a fraction of the ticks.
pub struct SimulatedSource {
    probability: f64,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests and replays.
    pub fn with_seed(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn control_packet(&mut self) -> RawEvent {
        RawEvent {
            observed_at: None,
            source_address: Some(format!("192.168.1.{}", self.rng.gen_range(0..255))),
            destination_address: Some(format!("10.0.0.{}", self.rng.gen_range(0..255))),
            protocol: Some("TCP".to_string()),
            size_bytes: Some(self.rng.gen_range(0..1500)),
            severity: Some("INFO".to_string()),
            info: Some("SYN ACK win=65535".to_string()),
        }
    }
}

impl TelemetrySource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn poll(&mut self) -> Vec<RawEvent> {
        if self.rng.gen_bool(self.probability) {
            vec![self.control_packet()]
        } else {
            Vec::new()
        }
    }
}

/// Cloneable handle used to push resource-timing entries into a
/// [`ResourceTimingSource`] from elsewhere (HTTP handler, file loader).
#[derive(Clone, Default)]
pub struct ResourceFeed {
    entries: Arc<Mutex<Vec<ResourceTiming>>>,
}

impl ResourceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: ResourceTiming) {
        self.lock().push(entry);
    }

    pub fn extend<I: IntoIterator<Item = ResourceTiming>>(&self, entries: I) {
        self.lock().extend(entries);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Loads a JSON array of entries; returns how many were added.
    pub fn load_json_file(&self, path: &Path) -> Result<usize, std::io::Error> {
        let content = fs::read_to_string(path)?;
        let entries: Vec<ResourceTiming> = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let count = entries.len();
        self.extend(entries);
        info!("Loaded {} resource-timing entries from {}", count, path.display());
        Ok(count)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ResourceTiming>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Walks a [`ResourceFeed`] with a cursor, a few entries per tick.
pub struct ResourceTimingSource {
    feed: ResourceFeed,
    cursor: usize,
    max_per_tick: usize,
}

impl ResourceTimingSource {
    pub fn new(feed: ResourceFeed, max_per_tick: usize) -> Self {
        Self {
            feed,
            cursor: 0,
            max_per_tick: max_per_tick.max(1),
        }
    }

    pub fn feed(&self) -> &ResourceFeed {
        &self.feed
    }
}

impl TelemetrySource for ResourceTimingSource {
    fn name(&self) -> &str {
        "resource-timing"
    }

    fn poll(&mut self) -> Vec<RawEvent> {
        let entries = self.feed.lock();
        if entries.len() <= self.cursor {
            return Vec::new();
        }
        let end = entries.len().min(self.cursor + self.max_per_tick);
        let batch: Vec<RawEvent> = entries[self.cursor..end]
            .iter()
            .cloned()
            .map(ResourceTiming::into_raw_event)
            .collect();
        debug!(
            "resource-timing: took entries {}..{} of {}",
            self.cursor,
            end,
            entries.len()
        );
        // Entries beyond the batch are skipped, the cursor jumps to the end.
        self.cursor = entries.len();
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ResourceTiming {
        ResourceTiming {
            name: name.to_string(),
            initiator_type: "fetch".to_string(),
            transfer_size: Some(300.0),
            duration_ms: 12.0,
        }
    }

    #[test]
    fn simulated_source_respects_probability_bounds() {
        let mut never = SimulatedSource::with_seed(0.0, 7);
        let mut always = SimulatedSource::with_seed(1.0, 7);
        for _ in 0..50 {
            assert!(never.poll().is_empty());
            let events = always.poll();
            assert_eq!(events.len(), 1);
            let ev = &events[0];
            assert_eq!(ev.protocol.as_deref(), Some("TCP"));
            assert!(ev.size_bytes.unwrap() < 1500);
            assert!(ev.source_address.as_deref().unwrap().starts_with("192.168.1."));
        }
    }

    #[test]
    fn resource_source_takes_a_bounded_batch_then_skips_ahead() {
        let feed = ResourceFeed::new();
        for i in 0..5 {
            feed.push(entry(&format!("https://host{}.example/", i)));
        }
        let mut source = ResourceTimingSource::new(feed.clone(), 3);

        let first = source.poll();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].destination_address.as_deref(), Some("host0.example"));
        assert!(source.poll().is_empty());

        feed.push(entry("https://late.example/"));
        let later = source.poll();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].destination_address.as_deref(), Some("late.example"));
    }

    #[test]
    fn feed_loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.json");
        std::fs::write(
            &path,
            r#"[{"name":"https://a.example/x","initiatorType":"img","transferSize":10,"durationMs":3.2},
                {"name":"https://b.example/y","initiatorType":"xmlhttprequest"}]"#,
        )
        .unwrap();

        let feed = ResourceFeed::new();
        assert_eq!(feed.load_json_file(&path).unwrap(), 2);
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn feed_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ResourceFeed::new().load_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
