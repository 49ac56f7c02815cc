// Capsesc Output Layer - Emitter
// Turns a decision into a complete keystroke on an event sink

use std::io;

use crate::error::Severity;
use crate::event::record::{EV_KEY, EV_SYN, SYN_REPORT};
use crate::Key;

/// One record written to the virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// EV_KEY with value 1 (press) or 0 (release)
    Key { key: Key, pressed: bool },
    /// EV_SYN / SYN_REPORT
    Sync,
}

impl OutputEvent {
    /// The raw (type, code, value) triple for this record
    pub fn raw(self) -> (u16, u16, i32) {
        match self {
            OutputEvent::Key { key, pressed } => (EV_KEY, key.code(), i32::from(pressed)),
            OutputEvent::Sync => (EV_SYN, SYN_REPORT, 0),
        }
    }
}

/// Anything records can be written to, one at a time
pub trait EventSink {
    fn write_event(&mut self, event: OutputEvent) -> io::Result<()>;
}

/// Error types for emission
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("Failed to write {event:?}: {source}")]
    Write {
        event: OutputEvent,
        #[source]
        source: io::Error,
    },
}

impl EmitError {
    pub fn severity(&self) -> Severity {
        Severity::Transient
    }
}

/// Emits complete key taps on a sink
pub struct Emitter<S> {
    sink: S,
}

impl<S: EventSink> Emitter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Press and release `key`.
    ///
    /// Always writes exactly four records in this order: key down, sync,
    /// key up, sync. A failed write does not stop the remaining ones, so a
    /// transient error cannot leave the key held down; the first error is
    /// returned.
    pub fn emit_tap(&mut self, key: Key) -> Result<(), EmitError> {
        let sequence = [
            OutputEvent::Key { key, pressed: true },
            OutputEvent::Sync,
            OutputEvent::Key {
                key,
                pressed: false,
            },
            OutputEvent::Sync,
        ];

        let mut first_error = None;
        for event in sequence {
            if let Err(source) = self.sink.write_event(event) {
                log::debug!("Write of {:?} failed: {}", event, source);
                first_error.get_or_insert(EmitError::Write { event, source });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
