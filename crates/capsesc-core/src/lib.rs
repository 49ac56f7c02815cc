// Capsesc Core Library
// Caps Lock tap to Escape: device tracking, multiplexing and gesture logic

pub mod error;
pub mod event;
pub mod gesture;
pub mod hotplug;
pub mod input;
pub mod key;
pub mod output;
pub mod settings;

pub use error::Severity;
pub use event::{
    shutdown_channel, Daemon, DaemonError, DeviceId, EventKind, EventRecord, Poller,
    ShutdownSignal, ShutdownTrigger,
};
pub use gesture::{Decision, GestureMachine, GestureState, GESTURE_KEY, GESTURE_TIMEOUT, SUBSTITUTE_KEY};
pub use hotplug::{HotplugAction, HotplugEvent, HotplugOutcome, HotplugWatcher};
pub use input::{
    AttachError, DeviceFilter, DeviceHandle, DeviceSet, KeyboardDevice, OpenDevice, ReadError,
    Registry, RegistryError,
};
pub use key::Key;
pub use output::{EmitError, Emitter, EventSink, OutputEvent};
pub use settings::{parse_log_level, Settings, SettingsError};

#[cfg(feature = "platform")]
pub use hotplug::{enumerate_keyboard_devices, spawn_hotplug_watcher};
#[cfg(feature = "platform")]
pub use input::{EvdevKeyboard, EvdevOpener};
#[cfg(feature = "platform")]
pub use output::{UInputError, VirtualKeyboard};
