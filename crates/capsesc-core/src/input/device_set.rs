// Capsesc Input Layer - Shared Device Set
// Registry and poller watch set kept in lock step behind one mutex

use std::io;
use std::os::fd::RawFd;

use parking_lot::Mutex;

use super::device::{KeyboardDevice, ReadError};
use super::registry::{DeviceHandle, Registry, RegistryError};
use crate::error::Severity;
use crate::event::{DeviceId, EventBatch, Poller};

/// Errors attaching a device to the set
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("Device {0} is already tracked")]
    AlreadyTracked(DeviceId),

    #[error("Device {0} is excluded by the device filter")]
    Filtered(DeviceId),

    #[error("Failed to open device: {0}")]
    Open(io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to watch device: {0}")]
    Watch(io::Error),
}

impl AttachError {
    pub fn severity(&self) -> Severity {
        match self {
            AttachError::Registry(e) => e.severity(),
            _ => Severity::DeviceLevel,
        }
    }

    /// Duplicates and filtered devices are expected outcomes, not failures
    pub fn log_level(&self) -> log::Level {
        match self {
            AttachError::AlreadyTracked(_) => log::Level::Debug,
            AttachError::Filtered(_) => log::Level::Info,
            _ => self.severity().log_level(),
        }
    }
}

/// Result of servicing one ready descriptor
#[derive(Debug)]
pub enum ReadOutcome {
    /// Records read from a live device (possibly none)
    Records(EventBatch),
    /// The descriptor no longer belongs to a tracked device
    Untracked,
    /// The device vanished mid-read and has been detached
    Removed(DeviceId),
    /// Reading failed for another reason; the device has been detached
    Failed(DeviceId, ReadError),
}

/// The set of tracked keyboards, shared by the daemon loop and the hotplug
/// watcher.
///
/// Every registry mutation and the matching poller `add`/`remove` happen
/// inside the same critical section, so a descriptor is watched if and only
/// if its device is registered. The poller itself is waited on without
/// holding the lock.
pub struct DeviceSet<D> {
    registry: Mutex<Registry<D>>,
    poller: Poller,
}

impl<D: KeyboardDevice> DeviceSet<D> {
    pub fn new(poller: Poller, capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::with_capacity(capacity)),
            poller,
        }
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Register a device and start watching its descriptor.
    ///
    /// The device is dropped (and its descriptor closed) on any failure.
    pub fn attach(
        &self,
        id: DeviceId,
        device: D,
        display_name: impl Into<String>,
    ) -> Result<(), AttachError> {
        let mut registry = self.registry.lock();
        if registry.contains(&id) {
            return Err(AttachError::AlreadyTracked(id));
        }

        let fd = device.as_raw_fd();
        registry.register(id.clone(), device, display_name)?;

        if let Err(e) = self.poller.add(fd, fd as u64) {
            drop(registry.unregister(&id));
            return Err(AttachError::Watch(e));
        }

        Ok(())
    }

    /// Stop watching and unregister a device.
    ///
    /// Returns the handle so the caller decides when the descriptor closes;
    /// `None` if the device is not tracked, which is expected when a hotplug
    /// removal races with a failed read.
    pub fn detach(&self, id: &DeviceId) -> Option<DeviceHandle<D>> {
        let mut registry = self.registry.lock();
        self.detach_locked(&mut registry, id)
    }

    fn detach_locked(&self, registry: &mut Registry<D>, id: &DeviceId) -> Option<DeviceHandle<D>> {
        let fd = registry.lookup(id)?.descriptor();
        if let Err(e) = self.poller.remove(fd) {
            log::debug!("Removing {} (fd {}) from poller: {}", id, fd, e);
        }
        registry.unregister(id)
    }

    /// Read from the device behind a ready descriptor.
    ///
    /// Devices that disappear or fail mid-read are detached here, under the
    /// same lock that resolved the descriptor.
    pub fn read_ready(&self, fd: RawFd, max_count: usize) -> ReadOutcome {
        let mut registry = self.registry.lock();

        let Some(id) = registry.find_by_descriptor(fd) else {
            return ReadOutcome::Untracked;
        };
        let result = match registry.lookup_mut(&id) {
            Some(handle) => handle.read_events(max_count),
            None => return ReadOutcome::Untracked,
        };

        match result {
            Ok(batch) => ReadOutcome::Records(batch),
            Err(ReadError::NoDevice) => {
                drop(self.detach_locked(&mut registry, &id));
                ReadOutcome::Removed(id)
            }
            Err(err) => {
                drop(self.detach_locked(&mut registry, &id));
                ReadOutcome::Failed(id, err)
            }
        }
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.registry.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Check that the watched descriptors (other than `control_tags`) are
    /// exactly the descriptors of registered devices
    pub fn is_consistent(&self, control_tags: &[u64]) -> bool {
        let registry = self.registry.lock();
        let mut watched: Vec<RawFd> = self
            .poller
            .watched()
            .into_iter()
            .filter(|(_, tag)| !control_tags.contains(tag))
            .map(|(fd, _)| fd)
            .collect();
        watched.sort_unstable();
        watched == registry.descriptors()
    }

    /// Detach every device, returning the handles for the caller to close
    pub fn detach_all(&self) -> Vec<DeviceHandle<D>> {
        let mut registry = self.registry.lock();
        for fd in registry.descriptors() {
            if let Err(e) = self.poller.remove(fd) {
                log::debug!("Removing fd {} from poller: {}", fd, e);
            }
        }
        registry.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventRecord;
    use crate::Key;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    struct PipeKeyboard {
        stream: UnixStream,
        pending: Vec<Key>,
        gone: bool,
    }

    impl AsRawFd for PipeKeyboard {
        fn as_raw_fd(&self) -> RawFd {
            self.stream.as_raw_fd()
        }
    }

    impl KeyboardDevice for PipeKeyboard {
        fn read_events(
            &mut self,
            source: &DeviceId,
            max_count: usize,
        ) -> Result<EventBatch, ReadError> {
            if self.gone {
                return Err(ReadError::NoDevice);
            }
            let mut buf = [0u8; 16];
            let _ = self.stream.read(&mut buf);
            let mut batch = EventBatch::with_capacity(max_count);
            for key in self.pending.drain(..) {
                batch.push(EventRecord::key_down(source.clone(), key));
            }
            Ok(batch)
        }
    }

    fn keyboard(pending: Vec<Key>) -> (PipeKeyboard, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        (
            PipeKeyboard {
                stream: a,
                pending,
                gone: false,
            },
            b,
        )
    }

    fn set(capacity: usize) -> DeviceSet<PipeKeyboard> {
        DeviceSet::new(Poller::new().unwrap(), capacity)
    }

    fn id(n: u32) -> DeviceId {
        DeviceId::new(format!("/dev/input/event{}", n))
    }

    #[test]
    fn test_attach_watches_descriptor() {
        let devices = set(4);
        let (kbd, _peer) = keyboard(vec![]);
        let fd = kbd.as_raw_fd();
        devices.attach(id(0), kbd, "kbd").unwrap();

        assert!(devices.poller().is_watching(fd));
        assert!(devices.contains(&id(0)));
        assert!(devices.is_consistent(&[]));
    }

    #[test]
    fn test_duplicate_attach_is_rejected() {
        let devices = set(4);
        let (first, _p1) = keyboard(vec![]);
        let (second, _p2) = keyboard(vec![]);
        devices.attach(id(0), first, "kbd").unwrap();

        let err = devices.attach(id(0), second, "kbd").unwrap_err();
        assert!(matches!(err, AttachError::AlreadyTracked(_)));
        assert_eq!(devices.len(), 1);
        assert!(devices.is_consistent(&[]));
    }

    #[test]
    fn test_full_set_leaves_no_orphan_watch() {
        let devices = set(1);
        let (first, _p1) = keyboard(vec![]);
        let (second, _p2) = keyboard(vec![]);
        let second_fd = second.as_raw_fd();
        devices.attach(id(0), first, "a").unwrap();

        let err = devices.attach(id(1), second, "b").unwrap_err();
        assert!(matches!(err, AttachError::Registry(RegistryError::TooManyDevices { .. })));
        assert!(!devices.poller().is_watching(second_fd));
        assert!(devices.is_consistent(&[]));
    }

    #[test]
    fn test_detach_unwatches_and_returns_handle() {
        let devices = set(4);
        let (kbd, _peer) = keyboard(vec![]);
        let fd = kbd.as_raw_fd();
        devices.attach(id(2), kbd, "kbd").unwrap();

        let handle = devices.detach(&id(2)).unwrap();
        assert_eq!(handle.descriptor(), fd);
        assert!(!devices.poller().is_watching(fd));
        assert!(devices.detach(&id(2)).is_none());
        assert!(devices.is_consistent(&[]));
    }

    #[test]
    fn test_read_ready_returns_records() {
        let devices = set(4);
        let (kbd, mut peer) = keyboard(vec![Key::CAPSLOCK]);
        let fd = kbd.as_raw_fd();
        devices.attach(id(0), kbd, "kbd").unwrap();
        peer.write_all(&[1]).unwrap();

        let mut ready = Vec::new();
        devices.poller().wait(&mut ready, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(ready, vec![fd as u64]);

        match devices.read_ready(fd, 32) {
            ReadOutcome::Records(batch) => {
                assert_eq!(batch.len(), 1);
                assert_eq!(batch.as_slice()[0].source, id(0));
                assert_eq!(batch.as_slice()[0].code, Key::CAPSLOCK);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_read_ready_for_unknown_descriptor_is_untracked() {
        let devices = set(4);
        assert!(matches!(devices.read_ready(999, 32), ReadOutcome::Untracked));
    }

    #[test]
    fn test_vanished_device_is_detached() {
        let devices = set(4);
        let (mut kbd, _peer) = keyboard(vec![]);
        kbd.gone = true;
        let fd = kbd.as_raw_fd();
        devices.attach(id(3), kbd, "kbd").unwrap();

        match devices.read_ready(fd, 32) {
            ReadOutcome::Removed(removed) => assert_eq!(removed, id(3)),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!devices.contains(&id(3)));
        assert!(devices.is_consistent(&[]));
        // A late hotplug removal for the same device is a no-op
        assert!(devices.detach(&id(3)).is_none());
    }

    #[test]
    fn test_invariant_holds_across_churn() {
        let devices = set(3);
        let mut peers = Vec::new();
        for round in 0..12u32 {
            let n = round % 4;
            if devices.contains(&id(n)) {
                drop(devices.detach(&id(n)));
            } else {
                let (kbd, peer) = keyboard(vec![]);
                peers.push(peer);
                let _ = devices.attach(id(n), kbd, "k");
            }
            assert!(devices.len() <= 3);
            assert!(devices.is_consistent(&[]));
        }
    }

    #[test]
    fn test_detach_all_clears_watches() {
        let devices = set(4);
        let (a, _pa) = keyboard(vec![]);
        let (b, _pb) = keyboard(vec![]);
        devices.attach(id(0), a, "a").unwrap();
        devices.attach(id(1), b, "b").unwrap();

        let handles = devices.detach_all();
        assert_eq!(handles.len(), 2);
        assert!(devices.is_empty());
        assert!(devices.poller().is_empty());
    }

    #[test]
    fn test_attach_error_levels() {
        let full = AttachError::Registry(RegistryError::TooManyDevices { capacity: 1 });
        assert_eq!(full.severity(), Severity::DeviceLevel);
        assert_eq!(full.log_level(), log::Level::Warn);
        assert_eq!(AttachError::AlreadyTracked(id(0)).log_level(), log::Level::Debug);
        assert_eq!(AttachError::Filtered(id(0)).log_level(), log::Level::Info);
        assert!(!AttachError::Open(io::Error::from_raw_os_error(libc::EACCES))
            .severity()
            .is_fatal());
    }

    #[test]
    fn test_control_tags_are_ignored_by_consistency_check() {
        let devices = set(4);
        let (control, _peer) = UnixStream::pair().unwrap();
        devices.poller().add(control.as_raw_fd(), u64::MAX).unwrap();
        assert!(devices.is_consistent(&[u64::MAX]));
        assert!(!devices.is_consistent(&[]));
    }
}
