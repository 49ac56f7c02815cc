// Capsesc Shutdown Channel
// Wakes the blocked daemon loop from signal handlers and the hotplug thread

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Poller tag reserved for the shutdown channel's read end
pub const SHUTDOWN_TAG: u64 = u64::MAX;

/// Sending side of the shutdown channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    writer: Arc<UnixStream>,
    fatal: Arc<AtomicBool>,
}

/// Receiving side, watched by the daemon loop under [`SHUTDOWN_TAG`].
#[derive(Debug)]
pub struct ShutdownSignal {
    reader: UnixStream,
    fatal: Arc<AtomicBool>,
}

/// Create a connected trigger/signal pair
pub fn shutdown_channel() -> io::Result<(ShutdownTrigger, ShutdownSignal)> {
    let (reader, writer) = UnixStream::pair()?;
    reader.set_nonblocking(true)?;
    writer.set_nonblocking(true)?;
    let fatal = Arc::new(AtomicBool::new(false));
    Ok((
        ShutdownTrigger {
            writer: Arc::new(writer),
            fatal: Arc::clone(&fatal),
        },
        ShutdownSignal { reader, fatal },
    ))
}

impl ShutdownTrigger {
    /// Ask the loop to stop cleanly
    pub fn request(&self) -> io::Result<()> {
        match (&*self.writer).write(&[1]) {
            Ok(_) => Ok(()),
            // The socket buffer is full, so a wake-up is already pending
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Ask the loop to stop because something unrecoverable happened
    pub fn request_fatal(&self) -> io::Result<()> {
        self.fatal.store(true, Ordering::SeqCst);
        self.request()
    }
}

impl ShutdownSignal {
    /// Whether any requester reported a fatal condition
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    /// Consume pending wake-up bytes
    pub fn drain(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }
}

impl AsRawFd for ShutdownSignal {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}
