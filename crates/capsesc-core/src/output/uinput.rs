// Capsesc Output Layer - uinput
// Virtual keyboard creation and record emission

use std::io;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId};

use super::emitter::{EventSink, OutputEvent};
use crate::error::Severity;
use crate::Key;

const VENDOR_ID: u16 = 0x1234;
const PRODUCT_ID: u16 = 0x5678;

/// Error types for uinput operations
#[derive(Debug, thiserror::Error)]
pub enum UInputError {
    #[error("Failed to create virtual device: {0}")]
    DeviceCreation(String),
}

impl UInputError {
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// Virtual uinput keyboard able to emit a single key.
///
/// The device is destroyed when this value is dropped.
pub struct VirtualKeyboard {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
}

impl VirtualKeyboard {
    /// Create a virtual keyboard named `name` that can emit `key`
    pub fn new(name: &str, key: Key) -> Result<Self, UInputError> {
        let mut keys = AttributeSet::<evdev::Key>::new();
        keys.insert(evdev::Key::new(key.code()));

        let device = VirtualDeviceBuilder::new()
            .map_err(|e: io::Error| UInputError::DeviceCreation(e.to_string()))?
            .name(name)
            .input_id(InputId::new(BusType::BUS_USB, VENDOR_ID, PRODUCT_ID, 1))
            .with_keys(&keys)
            .map_err(|e: io::Error| UInputError::DeviceCreation(e.to_string()))?
            .build()
            .map_err(|e: io::Error| UInputError::DeviceCreation(e.to_string()))?;

        Ok(Self {
            device,
            pending: Vec::with_capacity(2),
        })
    }
}

impl EventSink for VirtualKeyboard {
    /// Key records are buffered until the next sync. evdev's `emit`
    /// terminates each batch with its own SYN_REPORT, so flushing on `Sync`
    /// puts exactly one report after every key record on the wire.
    fn write_event(&mut self, event: OutputEvent) -> io::Result<()> {
        match event {
            OutputEvent::Key { .. } => {
                let (event_type, code, value) = event.raw();
                self.pending
                    .push(InputEvent::new(EventType(event_type), code, value));
                Ok(())
            }
            OutputEvent::Sync => {
                let result = self.device.emit(&self.pending);
                self.pending.clear();
                result
            }
        }
    }
}
