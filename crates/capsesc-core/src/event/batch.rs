// Capsesc Batch Event Processing
// Events read from one device in a single wake-up

use super::record::EventRecord;

/// Records read from one device during a single readiness notification.
///
/// The daemon reads everything a device has buffered, releases the device
/// lock, and only then feeds the batch to the gesture machine.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    events: Vec<EventRecord>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::with_capacity(batch_config::DEFAULT_READ_BATCH)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity.min(batch_config::MAX_BATCH_SIZE)),
        }
    }

    pub fn push(&mut self, event: EventRecord) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[EventRecord] {
        &self.events
    }
}

impl IntoIterator for EventBatch {
    type Item = EventRecord;
    type IntoIter = std::vec::IntoIter<EventRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl FromIterator<EventRecord> for EventBatch {
    fn from_iter<I: IntoIterator<Item = EventRecord>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

/// Batch size configuration
pub mod batch_config {
    /// Records requested per device read
    pub const DEFAULT_READ_BATCH: usize = 32;

    /// Readiness notifications collected per wait
    pub const DEFAULT_READY_BATCH: usize = 16;

    /// Upper bound on preallocation
    pub const MAX_BATCH_SIZE: usize = 256;
}
