// Capsesc Input Layer
// Keyboard devices, the registry that owns them, and device filtering

mod device;
mod device_set;
mod filter;
mod registry;

#[cfg(feature = "platform")]
mod backend;

pub use device::{is_virtual_device, KeyboardDevice, OpenDevice, OpenedDevice, ReadError};
pub use device_set::{AttachError, DeviceSet, ReadOutcome};
pub use filter::{matches_device_filter, DeviceFilter};
pub use registry::{DeviceHandle, Registry, RegistryError, DEFAULT_MAX_DEVICES};

#[cfg(feature = "platform")]
pub use backend::{EvdevKeyboard, EvdevOpener};
