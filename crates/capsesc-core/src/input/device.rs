// Capsesc Input Layer - Device Abstraction
// What the daemon needs from an open keyboard, independent of evdev

use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use crate::error::Severity;
use crate::event::{DeviceId, EventBatch};

/// Errors reading from an open keyboard
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The device was physically removed (ENODEV). Expected during unplug.
    #[error("Device no longer exists")]
    NoDevice,

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl ReadError {
    /// Map a read failure, singling out ENODEV
    pub fn from_io(err: io::Error) -> Self {
        if err.raw_os_error() == Some(libc::ENODEV) {
            ReadError::NoDevice
        } else {
            ReadError::Io(err)
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::DeviceLevel
    }
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

/// An open keyboard that owns its descriptor.
///
/// Dropping the value must close the descriptor.
pub trait KeyboardDevice: AsRawFd + Send {
    /// Read the records currently buffered on the device.
    ///
    /// The descriptor is non-blocking: when nothing is buffered this returns
    /// an empty batch rather than an error. `max_count` sizes the batch.
    fn read_events(&mut self, source: &DeviceId, max_count: usize)
        -> Result<EventBatch, ReadError>;
}

/// A freshly opened device together with its human readable name
#[derive(Debug)]
pub struct OpenedDevice<D> {
    pub device: D,
    pub name: String,
}

/// Opens device nodes on behalf of the hotplug watcher and enumeration.
pub trait OpenDevice: Send + Sync {
    type Device: KeyboardDevice;

    /// Open `devnode` read-only and non-blocking
    fn open_device(&self, devnode: &Path) -> io::Result<OpenedDevice<Self::Device>>;
}

/// Check if a device is a virtual device based on its name.
///
/// The daemon's own uinput device shows up as a keyboard too; reading
/// from it would feed emitted keys back into the gesture machine.
pub fn is_virtual_device(name: &str, virtual_name: &str) -> bool {
    !virtual_name.is_empty() && name == virtual_name
}
