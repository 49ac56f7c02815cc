// Capsesc Input Layer - Device Registry
// Open keyboards keyed by stable device identity

use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};

use super::device::{KeyboardDevice, ReadError};
use crate::error::Severity;
use crate::event::{DeviceId, EventBatch};

/// Default maximum number of tracked keyboards
pub const DEFAULT_MAX_DEVICES: usize = 32;

/// Errors from registry mutation
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Too many devices: at most {capacity} keyboards can be tracked")]
    TooManyDevices { capacity: usize },
}

impl RegistryError {
    pub fn severity(&self) -> Severity {
        Severity::DeviceLevel
    }
}

/// One open keyboard. The handle exclusively owns the device and therefore
/// its descriptor; dropping the handle closes it.
#[derive(Debug)]
pub struct DeviceHandle<D> {
    id: DeviceId,
    device: D,
    display_name: String,
}

impl<D: AsRawFd> DeviceHandle<D> {
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn descriptor(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

impl<D: KeyboardDevice> DeviceHandle<D> {
    /// Read buffered records, tagging each with this handle's id
    pub fn read_events(&mut self, max_count: usize) -> Result<EventBatch, ReadError> {
        self.device.read_events(&self.id, max_count)
    }
}

/// Mapping from [`DeviceId`] to open keyboards, with a descriptor index so
/// readiness reported by descriptor resolves in O(1).
///
/// The registry is not synchronized; see [`super::DeviceSet`] for the
/// shared wrapper that keeps it in step with the poller.
#[derive(Debug)]
pub struct Registry<D> {
    devices: HashMap<DeviceId, DeviceHandle<D>>,
    by_descriptor: HashMap<RawFd, DeviceId>,
    capacity: usize,
}

impl<D: AsRawFd> Registry<D> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_DEVICES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            devices: HashMap::with_capacity(capacity),
            by_descriptor: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a device, taking ownership of it.
    ///
    /// Registering an id that is already present is a caller error; check
    /// [`Registry::lookup`] first. On failure the device is dropped, which
    /// closes its descriptor.
    pub fn register(
        &mut self,
        id: DeviceId,
        device: D,
        display_name: impl Into<String>,
    ) -> Result<(), RegistryError> {
        debug_assert!(
            !self.devices.contains_key(&id),
            "duplicate registration of {}",
            id
        );
        if self.devices.len() >= self.capacity {
            return Err(RegistryError::TooManyDevices {
                capacity: self.capacity,
            });
        }

        let handle = DeviceHandle {
            id: id.clone(),
            device,
            display_name: display_name.into(),
        };
        self.by_descriptor.insert(handle.descriptor(), id.clone());
        self.devices.insert(id, handle);
        Ok(())
    }

    /// Remove and return the handle for `id`, or `None` if it is not tracked
    pub fn unregister(&mut self, id: &DeviceId) -> Option<DeviceHandle<D>> {
        let handle = self.devices.remove(id)?;
        self.by_descriptor.remove(&handle.descriptor());
        Some(handle)
    }

    pub fn lookup(&self, id: &DeviceId) -> Option<&DeviceHandle<D>> {
        self.devices.get(id)
    }

    pub fn lookup_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceHandle<D>> {
        self.devices.get_mut(id)
    }

    /// Resolve a ready descriptor back to the device that owns it
    pub fn find_by_descriptor(&self, fd: RawFd) -> Option<DeviceId> {
        self.by_descriptor.get(&fd).cloned()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Descriptors of every live entry, sorted
    pub fn descriptors(&self) -> Vec<RawFd> {
        let mut fds: Vec<RawFd> = self.by_descriptor.keys().copied().collect();
        fds.sort_unstable();
        fds
    }

    /// Remove every entry, returning the handles
    pub fn drain(&mut self) -> Vec<DeviceHandle<D>> {
        self.by_descriptor.clear();
        self.devices.drain().map(|(_, handle)| handle).collect()
    }
}

impl<D: AsRawFd> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}
