// Capsesc Hotplug - udev Monitor
// Keyboard enumeration and the notification thread

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;

use super::{HotplugEvent, HotplugWatcher};
use crate::event::{DeviceId, ShutdownTrigger};
use crate::input::OpenDevice;

const SUBSYSTEM: &str = "input";
const KEYBOARD_PROPERTY: &str = "ID_INPUT_KEYBOARD";

/// List the device nodes of every keyboard currently present
pub fn enumerate_keyboard_devices() -> io::Result<Vec<(DeviceId, PathBuf)>> {
    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem(SUBSYSTEM)?;
    enumerator.match_property(KEYBOARD_PROPERTY, "1")?;

    let mut found = Vec::new();
    for device in enumerator.scan_devices()? {
        let Some(devnode) = device.devnode() else {
            continue;
        };
        log::debug!(
            "Found keyboard device {} at {}",
            device.syspath().display(),
            devnode.display()
        );
        found.push((DeviceId::new(devnode.to_string_lossy()), devnode.to_path_buf()));
    }
    Ok(found)
}

/// Start the hotplug thread.
///
/// The udev subscription is created on the new thread; this returns only
/// once it is listening, or with the subscription error. If the
/// notification socket later fails, the thread requests a fatal shutdown
/// through `trigger`, since the daemon could no longer see new keyboards.
pub fn spawn_hotplug_watcher<O>(
    watcher: HotplugWatcher<O>,
    trigger: ShutdownTrigger,
) -> io::Result<JoinHandle<()>>
where
    O: OpenDevice + 'static,
    O::Device: 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<io::Result<()>>();

    let handle = std::thread::Builder::new()
        .name("hotplug".to_string())
        .spawn(move || {
            let socket = match subscribe() {
                Ok(socket) => {
                    let _ = ready_tx.send(Ok(()));
                    socket
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = monitor(&watcher, socket) {
                log::error!("Hotplug monitoring failed: {}", e);
                if let Err(e) = trigger.request_fatal() {
                    log::error!("Could not stop the daemon loop: {}", e);
                    std::process::abort();
                }
            }
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(io::Error::new(
            io::ErrorKind::Other,
            "hotplug thread exited during setup",
        )),
    }
}

fn subscribe() -> io::Result<udev::MonitorSocket> {
    udev::MonitorBuilder::new()?
        .match_subsystem(SUBSYSTEM)?
        .listen()
}

/// Block on the monitor socket and dispatch notifications until it fails
fn monitor<O: OpenDevice>(
    watcher: &HotplugWatcher<O>,
    socket: udev::MonitorSocket,
) -> io::Result<()> {
    let mut fds = [libc::pollfd {
        fd: socket.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    }];

    loop {
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        if fds[0].revents & (libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "udev monitor socket closed",
            ));
        }

        if fds[0].revents & libc::POLLERR != 0 {
            match take_socket_error(socket.as_raw_fd())? {
                Some(err) if is_overflow(&err) => {
                    // Notifications were dropped; rescan to pick up missed
                    // arrivals. Missed removals surface as ENODEV on read.
                    log::warn!("udev notifications were dropped, rescanning keyboards");
                    drain(watcher, &socket);
                    watcher.seed(enumerate_keyboard_devices()?);
                    continue;
                }
                Some(err) => return Err(err),
                None => {}
            }
        }

        drain(watcher, &socket);
    }
}

/// Dispatch every notification currently queued on the socket
fn drain<O: OpenDevice>(watcher: &HotplugWatcher<O>, socket: &udev::MonitorSocket) {
    for event in socket.iter() {
        let parsed = HotplugEvent::from_parts(
            event.action(),
            event.devnode(),
            event.property_value(KEYBOARD_PROPERTY),
        );
        if let Some(parsed) = parsed {
            log::debug!("Detected {:?} of {}", parsed.action, parsed.device_id);
            watcher.handle(parsed);
        }
    }
}

/// Fetch and clear the pending error on a socket (SO_ERROR)
fn take_socket_error(fd: RawFd) -> io::Result<Option<io::Error>> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            (&mut value as *mut libc::c_int).cast(),
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((value != 0).then(|| io::Error::from_raw_os_error(value)))
}

/// The kernel ran out of receive buffer and dropped notifications
fn is_overflow(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOBUFS)
}
