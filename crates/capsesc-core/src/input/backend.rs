// Capsesc Input Layer - evdev Backend
// Real keyboards opened from /dev/input nodes

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::time::UNIX_EPOCH;

use evdev::Device;

use super::device::{KeyboardDevice, OpenedDevice, OpenDevice, ReadError};
use crate::event::{DeviceId, EventBatch, EventKind, EventRecord};
use crate::Key;

/// An open evdev keyboard node
pub struct EvdevKeyboard {
    device: Device,
}

impl EvdevKeyboard {
    /// Open a device node and switch it to non-blocking reads.
    ///
    /// evdev may hand back a read-write descriptor; nothing is ever written
    /// to it.
    pub fn open(devnode: &Path) -> io::Result<Self> {
        let device = Device::open(devnode)?;
        set_nonblocking(device.as_raw_fd())?;
        Ok(Self { device })
    }

    pub fn name(&self) -> &str {
        self.device.name().unwrap_or("Unknown")
    }
}

impl AsRawFd for EvdevKeyboard {
    fn as_raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

impl KeyboardDevice for EvdevKeyboard {
    fn read_events(
        &mut self,
        source: &DeviceId,
        max_count: usize,
    ) -> Result<EventBatch, ReadError> {
        let mut batch = EventBatch::with_capacity(max_count);

        let events = match self.device.fetch_events() {
            Ok(events) => events,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(batch),
            Err(e) => return Err(ReadError::from_io(e)),
        };

        for event in events {
            let timestamp = event
                .timestamp()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            batch.push(EventRecord::new(
                source.clone(),
                EventKind::classify(event.event_type().0, event.value()),
                Key::from(event.code()),
                timestamp,
            ));
        }

        Ok(batch)
    }
}

/// Opens keyboards through evdev
#[derive(Debug, Clone, Copy, Default)]
pub struct EvdevOpener;

impl OpenDevice for EvdevOpener {
    type Device = EvdevKeyboard;

    fn open_device(&self, devnode: &Path) -> io::Result<OpenedDevice<EvdevKeyboard>> {
        let device = EvdevKeyboard::open(devnode)?;
        let name = device.name().to_string();
        Ok(OpenedDevice { device, name })
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_node_fails() {
        let result = EvdevOpener.open_device(Path::new("/dev/input/does-not-exist"));
        assert!(result.is_err());
    }

    #[test]
    fn test_set_nonblocking_on_socket() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        set_nonblocking(a.as_raw_fd()).unwrap();
        let flags = unsafe { libc::fcntl(a.as_raw_fd(), libc::F_GETFL) };
        assert!(flags & libc::O_NONBLOCK != 0);
    }
}
