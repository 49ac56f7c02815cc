// Capsesc Readiness Multiplexer
// epoll wrapper that tolerates watch-set changes during a blocking wait

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use parking_lot::Mutex;

use super::batch::batch_config;

/// Readiness set over raw descriptors.
///
/// Each descriptor is registered with a caller-chosen `u64` tag, and `wait`
/// reports the tags of ready descriptors. `epoll_ctl` may be called while
/// another thread is blocked in `epoll_wait` on the same instance, so
/// `add`/`remove` take `&self` and are safe to use from the hotplug thread
/// while the daemon loop waits.
///
/// Descriptors are watched level-triggered for `EPOLLIN`; hangups and
/// errors are reported as readiness too, so the subsequent read surfaces
/// them.
pub struct Poller {
    epoll: OwnedFd,
    watched: Mutex<HashMap<RawFd, u64>>,
}

impl Poller {
    /// Create a new epoll instance
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_create1 returned a fresh descriptor nobody else owns
        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            epoll,
            watched: Mutex::new(HashMap::new()),
        })
    }

    /// Start watching `fd` for readability, reporting it as `tag`
    pub fn add(&self, fd: RawFd, tag: u64) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: tag,
        };
        let rc = unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        self.watched.lock().insert(fd, tag);
        Ok(())
    }

    /// Stop watching `fd`.
    ///
    /// Must be called before the descriptor is closed. The descriptor is
    /// forgotten even if the kernel reports an error.
    pub fn remove(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
        self.watched.lock().remove(&fd);
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until at least one descriptor is ready, then fill `ready` with
    /// their tags.
    ///
    /// `None` waits indefinitely. An interrupted wait (EINTR) returns with
    /// `ready` empty so the caller can re-check its own state.
    pub fn wait(&self, ready: &mut Vec<u64>, timeout: Option<Duration>) -> io::Result<()> {
        ready.clear();

        let mut events =
            [libc::epoll_event { events: 0, u64: 0 }; batch_config::DEFAULT_READY_BATCH];
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };

        let count = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                events.as_mut_ptr(),
                events.len() as libc::c_int,
                timeout_ms,
            )
        };

        if count < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        ready.extend(events[..count as usize].iter().map(|e| e.u64));
        Ok(())
    }

    pub fn is_watching(&self, fd: RawFd) -> bool {
        self.watched.lock().contains_key(&fd)
    }

    /// Snapshot of every watched descriptor with its tag
    pub fn watched(&self) -> Vec<(RawFd, u64)> {
        let mut watched: Vec<(RawFd, u64)> =
            self.watched.lock().iter().map(|(fd, tag)| (*fd, *tag)).collect();
        watched.sort_unstable();
        watched
    }

    pub fn len(&self) -> usize {
        self.watched.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.lock().is_empty()
    }
}

impl AsRawFd for Poller {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll.as_raw_fd()
    }
}
