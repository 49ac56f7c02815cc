// Capsesc Daemon Loop
// Waits on every keyboard, feeds the gesture machine, emits substitutes

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Instant;

use super::batch::batch_config;
use super::record::EventRecord;
use super::shutdown::{ShutdownSignal, SHUTDOWN_TAG};
use crate::error::Severity;
use crate::gesture::{Decision, GestureMachine};
use crate::input::{DeviceSet, KeyboardDevice, ReadOutcome};
use crate::output::{Emitter, EventSink};

/// Result type for daemon loop operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors that stop the daemon loop. All of them are fatal; device-level
/// and transient problems are logged and absorbed inside the loop.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("Failed to watch the shutdown channel: {0}")]
    Setup(io::Error),

    #[error("Waiting for input failed: {0}")]
    Wait(io::Error),

    #[error("Hotplug monitoring stopped; new keyboards can no longer be detected")]
    HotplugLost,
}

impl DaemonError {
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// The daemon's main loop.
///
/// Blocks in the poller with no timeout. Each wake-up reads every ready
/// keyboard, runs the records through the gesture machine in arrival order
/// and taps the substitute key on the emitter when the machine says so.
/// The gesture timeout is evaluated while processing; there is no timer.
pub struct Daemon<D: KeyboardDevice, S: EventSink> {
    devices: Arc<DeviceSet<D>>,
    gesture: GestureMachine,
    emitter: Emitter<S>,
    shutdown: ShutdownSignal,
    emitted: u64,
}

impl<D: KeyboardDevice, S: EventSink> Daemon<D, S> {
    /// Create the loop and start watching the shutdown channel
    pub fn new(
        devices: Arc<DeviceSet<D>>,
        emitter: Emitter<S>,
        shutdown: ShutdownSignal,
    ) -> DaemonResult<Self> {
        devices
            .poller()
            .add(shutdown.as_raw_fd(), SHUTDOWN_TAG)
            .map_err(DaemonError::Setup)?;

        Ok(Self {
            devices,
            gesture: GestureMachine::new(),
            emitter,
            shutdown,
            emitted: 0,
        })
    }

    /// Run until a shutdown request arrives.
    ///
    /// Returns `Ok` for a clean stop and an error when the stop was caused
    /// by a fatal condition.
    pub fn run(&mut self) -> DaemonResult<()> {
        log::info!("Watching {} keyboard(s)", self.devices.len());
        let mut ready = Vec::with_capacity(batch_config::DEFAULT_READY_BATCH);

        loop {
            self.devices
                .poller()
                .wait(&mut ready, None)
                .map_err(DaemonError::Wait)?;

            // Input that arrived with the shutdown request is still handled
            let mut stop = false;
            for &tag in &ready {
                if tag == SHUTDOWN_TAG {
                    stop = true;
                } else {
                    self.service(tag as RawFd);
                }
            }

            if stop {
                self.shutdown.drain();
                if self.shutdown.is_fatal() {
                    return Err(DaemonError::HotplugLost);
                }
                log::info!("Shutting down");
                return Ok(());
            }
        }
    }

    /// Read one ready descriptor and process what it produced
    fn service(&mut self, fd: RawFd) {
        let batch = match self.devices.read_ready(fd, batch_config::DEFAULT_READ_BATCH) {
            ReadOutcome::Records(batch) => batch,
            ReadOutcome::Untracked => {
                log::trace!("Discarding readiness of untracked fd {}", fd);
                return;
            }
            ReadOutcome::Removed(id) => {
                log::info!("Keyboard {} disappeared", id);
                return;
            }
            ReadOutcome::Failed(id, err) => {
                log::log!(
                    err.severity().log_level(),
                    "Dropping keyboard {} after read error: {}",
                    id,
                    err
                );
                return;
            }
        };

        for record in batch.iter() {
            self.process(record, Instant::now());
        }
    }

    /// Run one record through the gesture machine, emitting if it fires.
    ///
    /// Records from a device that is no longer tracked are discarded; the
    /// hotplug thread may remove a device between its read and this call.
    pub fn process(&mut self, record: &EventRecord, now: Instant) -> Decision {
        log::trace!(
            "Event: time {}.{:06}, source: {}, kind: {:?}, code: {}",
            record.timestamp.as_secs(),
            record.timestamp.subsec_micros(),
            record.source,
            record.kind,
            record.code
        );

        if !self.devices.contains(&record.source) {
            log::trace!("Discarding record from untracked {}", record.source);
            return Decision::Nothing;
        }

        let decision = self.gesture.process(record, now);
        if let Decision::Emit(key) = decision {
            log::debug!("Sending {}", key);
            match self.emitter.emit_tap(key) {
                Ok(()) => self.emitted += 1,
                Err(e) => log::log!(e.severity().log_level(), "Could not emit {}: {}", key, e),
            }
        }
        decision
    }

    /// Number of substitute taps written successfully
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn devices(&self) -> &Arc<DeviceSet<D>> {
        &self.devices
    }

    pub fn emitter(&self) -> &Emitter<S> {
        &self.emitter
    }
}

impl<D: KeyboardDevice, S: EventSink> Drop for Daemon<D, S> {
    /// Stop watching everything and close every keyboard
    fn drop(&mut self) {
        let _ = self.devices.poller().remove(self.shutdown.as_raw_fd());
        let handles = self.devices.detach_all();
        log::debug!("Closed {} keyboard(s)", handles.len());
    }
}
