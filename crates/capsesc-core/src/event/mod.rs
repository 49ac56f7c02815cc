// Capsesc Event Handling
// Records, readiness multiplexing and the daemon loop

pub mod batch;
pub mod r#loop;
pub mod poller;
pub mod record;
pub mod shutdown;

pub use batch::{batch_config, EventBatch};
pub use poller::Poller;
pub use r#loop::{Daemon, DaemonError, DaemonResult};
pub use record::{DeviceId, EventKind, EventRecord};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger, SHUTDOWN_TAG};
