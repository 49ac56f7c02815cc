// Capsesc Hotplug Handling
// Device arrival/removal notifications applied to the shared device set

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::event::DeviceId;
use crate::input::{AttachError, DeviceFilter, DeviceSet, OpenDevice};

#[cfg(feature = "platform")]
mod monitor;

#[cfg(feature = "platform")]
pub use monitor::{enumerate_keyboard_devices, spawn_hotplug_watcher};

/// What happened to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugAction {
    Add,
    Remove,
    /// change, bind, online, or no action at all
    Other,
}

impl HotplugAction {
    /// Parse the udev ACTION value
    pub fn from_action(action: Option<&OsStr>) -> Self {
        match action.and_then(OsStr::to_str) {
            Some("add") => HotplugAction::Add,
            Some("remove") => HotplugAction::Remove,
            _ => HotplugAction::Other,
        }
    }
}

/// A device notification, already reduced to what the daemon needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    pub action: HotplugAction,
    pub device_id: DeviceId,
    pub is_keyboard: bool,
    pub devnode: PathBuf,
}

impl HotplugEvent {
    /// Build an event from raw notification fields.
    ///
    /// Returns `None` for notifications without a device node; those belong
    /// to parent `inputN` devices that cannot be read from.
    pub fn from_parts(
        action: Option<&OsStr>,
        devnode: Option<&Path>,
        keyboard_property: Option<&OsStr>,
    ) -> Option<Self> {
        let devnode = devnode?;
        Some(Self {
            action: HotplugAction::from_action(action),
            device_id: DeviceId::new(devnode.to_string_lossy()),
            is_keyboard: is_keyboard_property(keyboard_property),
            devnode: devnode.to_path_buf(),
        })
    }
}

/// udev marks keyboards with `ID_INPUT_KEYBOARD=1`
pub fn is_keyboard_property(value: Option<&OsStr>) -> bool {
    value.map_or(false, |v| v == "1")
}

/// What handling a notification did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugOutcome {
    Attached(DeviceId),
    Detached(DeviceId),
    Ignored,
}

/// Applies hotplug notifications and the startup enumeration to the shared
/// device set.
pub struct HotplugWatcher<O: OpenDevice> {
    devices: Arc<DeviceSet<O::Device>>,
    opener: O,
    filter: DeviceFilter,
}

impl<O: OpenDevice> HotplugWatcher<O> {
    pub fn new(devices: Arc<DeviceSet<O::Device>>, opener: O, filter: DeviceFilter) -> Self {
        Self {
            devices,
            opener,
            filter,
        }
    }

    pub fn devices(&self) -> &Arc<DeviceSet<O::Device>> {
        &self.devices
    }

    /// Handle one notification. Failures are logged and leave the device
    /// untracked; nothing here is fatal.
    pub fn handle(&self, event: HotplugEvent) -> HotplugOutcome {
        if !event.is_keyboard {
            log::trace!("Ignoring non-keyboard device {}", event.device_id);
            return HotplugOutcome::Ignored;
        }

        match event.action {
            HotplugAction::Add => {
                log::debug!("Keyboard added: {}", event.device_id);
                match self.add_device(event.device_id.clone(), &event.devnode) {
                    Ok(()) => HotplugOutcome::Attached(event.device_id),
                    Err(e) => {
                        log_attach_error(&event.device_id, &e);
                        HotplugOutcome::Ignored
                    }
                }
            }
            HotplugAction::Remove => {
                if self.remove_device(&event.device_id) {
                    HotplugOutcome::Detached(event.device_id)
                } else {
                    log::debug!("Removed device {} was not tracked", event.device_id);
                    HotplugOutcome::Ignored
                }
            }
            HotplugAction::Other => HotplugOutcome::Ignored,
        }
    }

    /// Open, filter, register and watch one device node
    pub fn add_device(&self, id: DeviceId, devnode: &Path) -> Result<(), AttachError> {
        if self.devices.contains(&id) {
            return Err(AttachError::AlreadyTracked(id));
        }

        let opened = self.opener.open_device(devnode).map_err(AttachError::Open)?;
        if !self.filter.accepts(&opened.name, id.as_str()) {
            return Err(AttachError::Filtered(id));
        }

        let name = opened.name.clone();
        self.devices.attach(id.clone(), opened.device, opened.name)?;
        log::info!("Tracking keyboard {} ({})", id, name);
        Ok(())
    }

    /// Stop tracking a device and close it. Returns false if it was not
    /// tracked.
    pub fn remove_device(&self, id: &DeviceId) -> bool {
        match self.devices.detach(id) {
            Some(handle) => {
                log::info!("Keyboard removed: {} ({})", id, handle.display_name());
                drop(handle);
                true
            }
            None => false,
        }
    }

    /// Attach every enumerated device, returning how many are now tracked
    pub fn seed(&self, found: impl IntoIterator<Item = (DeviceId, PathBuf)>) -> usize {
        for (id, devnode) in found {
            if let Err(e) = self.add_device(id.clone(), &devnode) {
                log_attach_error(&id, &e);
            }
        }
        self.devices.len()
    }
}

fn log_attach_error(id: &DeviceId, err: &AttachError) {
    match err {
        AttachError::AlreadyTracked(_) | AttachError::Filtered(_) => {
            log::log!(err.log_level(), "{}", err)
        }
        _ => log::log!(err.log_level(), "Could not track keyboard {}: {}", id, err),
    }
}
