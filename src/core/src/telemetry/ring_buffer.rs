use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};

use super::types::Record;

/// Fixed-capacity FIFO of the most recent records, oldest first.
///
/// The deque sits behind a mutex so the ingestion task and HTTP handlers can
/// share one buffer across runtime threads.
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    records: Mutex<VecDeque<Record>>,
}

impl RingBuffer {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Appends `record`, evicting the oldest entries beyond capacity.
    ///
    /// Out-of-order sequences are a caller bug; they are logged and appended
    /// as-is.
    pub fn append(&self, record: Record) {
        let mut records = self.lock();
        if let Some(last) = records.back() {
            if record.sequence <= last.sequence {
                warn!(
                    "record #{} appended after #{}; sequence is not increasing",
                    record.sequence, last.sequence
                );
            }
        }
        while records.len() >= self.capacity {
            if let Some(evicted) = records.pop_front() {
                debug!("evicted record #{}", evicted.sequence);
            }
        }
        records.push_back(record);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().iter().cloned().collect()
    }

    pub fn find(&self, sequence: u64) -> Option<Record> {
        self.lock().iter().find(|r| r.sequence == sequence).cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A poisoned lock only means another thread panicked mid-append; the
    // deque itself is still consistent, so keep serving it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Record>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
