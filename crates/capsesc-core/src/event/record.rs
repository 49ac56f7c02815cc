// Capsesc Event Records
// Device identity and the decoded form of raw input events

use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

use crate::Key;

/// EV_SYN event type code
pub const EV_SYN: u16 = 0x00;

/// EV_KEY event type code
pub const EV_KEY: u16 = 0x01;

/// SYN_REPORT event code
pub const SYN_REPORT: u16 = 0x00;

/// Stable identity of a physical device, independent of its descriptor.
///
/// This is the device node path reported by udev (e.g. `/dev/input/event3`).
/// Descriptors get recycled by the kernel; device ids are only reused once
/// the previous device with that id is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Classification of a raw input event.
///
/// Only presses and releases are key transitions. Auto-repeat records
/// (value 2), synchronization markers and axis data are all `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    Other,
}

impl EventKind {
    /// Classify an evdev (type, value) pair
    pub fn classify(event_type: u16, value: i32) -> Self {
        if event_type != EV_KEY {
            return EventKind::Other;
        }
        match value {
            1 => EventKind::KeyDown,
            0 => EventKind::KeyUp,
            _ => EventKind::Other,
        }
    }
}

/// A decoded input event read from one keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Device the event was read from
    pub source: DeviceId,
    pub kind: EventKind,
    pub code: Key,
    /// Device-reported time; diagnostics only
    pub timestamp: Duration,
}

impl EventRecord {
    pub fn new(source: DeviceId, kind: EventKind, code: Key, timestamp: Duration) -> Self {
        Self {
            source,
            kind,
            code,
            timestamp,
        }
    }

    /// Shorthand for a key press record
    pub fn key_down(source: DeviceId, code: Key) -> Self {
        Self::new(source, EventKind::KeyDown, code, Duration::ZERO)
    }

    /// Shorthand for a key release record
    pub fn key_up(source: DeviceId, code: Key) -> Self {
        Self::new(source, EventKind::KeyUp, code, Duration::ZERO)
    }

    pub fn is_key_transition(&self) -> bool {
        !matches!(self.kind, EventKind::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_key_values() {
        assert_eq!(EventKind::classify(EV_KEY, 1), EventKind::KeyDown);
        assert_eq!(EventKind::classify(EV_KEY, 0), EventKind::KeyUp);
    }

    #[test]
    fn test_classify_repeat_is_not_a_transition() {
        assert_eq!(EventKind::classify(EV_KEY, 2), EventKind::Other);
    }

    #[test]
    fn test_classify_non_key_events() {
        assert_eq!(EventKind::classify(EV_SYN, 0), EventKind::Other);
        assert_eq!(EventKind::classify(0x02, 1), EventKind::Other); // EV_REL
        assert_eq!(EventKind::classify(0x04, 0), EventKind::Other); // EV_ABS
    }

    #[test]
    fn test_device_id_keeps_full_path() {
        let id = DeviceId::new("/dev/input/event12");
        assert_eq!(id.as_str(), "/dev/input/event12");
        assert_eq!(id.to_string().len(), "/dev/input/event12".len());
    }

    #[test]
    fn test_record_helpers() {
        let id = DeviceId::from("/dev/input/event0");
        let down = EventRecord::key_down(id.clone(), Key::CAPSLOCK);
        assert!(down.is_key_transition());
        assert_eq!(down.kind, EventKind::KeyDown);

        let syn = EventRecord::new(id, EventKind::Other, Key(0), Duration::ZERO);
        assert!(!syn.is_key_transition());
    }
}
