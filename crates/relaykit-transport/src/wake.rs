//! Cross-thread wakeup for cancellable blocking waits.
//!
//! A relay pipe's worker blocks waiting for input; destroying the pipe must
//! interrupt that wait. The wake channel is a CLOEXEC self-pipe: the sender
//! half writes one byte, the receiver half becomes readable, and
//! [`wait_readable_or_wake`] multiplexes it against the data descriptor.

use std::io::ErrorKind;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::error::{Result, TransportError};

/// Sending half of a wake channel.
pub struct WakeSender {
    fd: OwnedFd,
}

/// Receiving half of a wake channel; pollable via [`WakeReceiver::fd`].
pub struct WakeReceiver {
    fd: OwnedFd,
}

/// Outcome of a combined data/wake wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEvent {
    /// The data descriptor has bytes available (or hit end-of-stream).
    Readable,
    /// The wake channel was signalled.
    Woken,
}

/// Create a connected wake channel.
pub fn wake_pair() -> Result<(WakeSender, WakeReceiver)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid writable array of two c_ints.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    // SAFETY: pipe() returned two freshly created descriptors we now own.
    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    for fd in [&rx, &tx] {
        set_cloexec(fd.as_raw_fd())?;
    }

    Ok((WakeSender { fd: tx }, WakeReceiver { fd: rx }))
}

impl WakeSender {
    /// Signal the receiving half. Never blocks meaningfully (one byte) and
    /// ignores a peer that is already gone.
    pub fn wake(&self) {
        let byte = [1u8];
        // SAFETY: `byte` is a valid one-byte buffer and the descriptor is an
        // open pipe write end owned by self.
        let _ = unsafe { libc::write(self.fd.as_raw_fd(), byte.as_ptr().cast(), 1) };
    }
}

impl WakeReceiver {
    /// The pollable descriptor of this half.
    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Block until `data_fd` is readable or the wake channel is signalled.
///
/// A wake-up takes priority when both fire in the same poll round.
pub fn wait_readable_or_wake(data_fd: RawFd, wake_fd: RawFd) -> Result<PipeEvent> {
    let mut pfds = [
        libc::pollfd {
            fd: data_fd,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: wake_fd,
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    loop {
        // SAFETY: `pfds` is a valid array of two pollfds for the call.
        let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, -1) };
        if rc >= 1 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if rc == -1 && err.kind() == ErrorKind::Interrupted {
            continue;
        }
        return Err(TransportError::Io(err));
    }

    if pfds[1].revents & (libc::POLLIN | libc::POLLHUP) != 0 {
        return Ok(PipeEvent::Woken);
    }
    if pfds[0].revents & libc::POLLERR != 0 {
        return Err(TransportError::Io(std::io::Error::other(
            "descriptor reported error while waiting for input",
        )));
    }
    Ok(PipeEvent::Readable)
}

fn set_cloexec(fd: RawFd) -> Result<()> {
    // SAFETY: fcntl on an open descriptor we own; no pointers involved.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    if rc == -1 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wake_interrupts_idle_wait() {
        let (data, _peer) = UnixStream::pair().unwrap();
        let (tx, rx) = wake_pair().unwrap();

        let waiter = std::thread::spawn(move || {
            wait_readable_or_wake(data.as_raw_fd(), rx.fd()).unwrap()
        });

        std::thread::sleep(Duration::from_millis(20));
        tx.wake();
        assert_eq!(waiter.join().unwrap(), PipeEvent::Woken);
    }

    #[test]
    fn data_readiness_reported() {
        let (data, mut peer) = UnixStream::pair().unwrap();
        let (_tx, rx) = wake_pair().unwrap();

        peer.write_all(b"!").unwrap();
        let event = wait_readable_or_wake(data.as_raw_fd(), rx.fd()).unwrap();
        assert_eq!(event, PipeEvent::Readable);
    }

    #[test]
    fn wake_wins_when_both_ready() {
        let (data, mut peer) = UnixStream::pair().unwrap();
        let (tx, rx) = wake_pair().unwrap();

        peer.write_all(b"!").unwrap();
        tx.wake();
        let event = wait_readable_or_wake(data.as_raw_fd(), rx.fd()).unwrap();
        assert_eq!(event, PipeEvent::Woken);
    }

    #[test]
    fn eof_counts_as_readable() {
        let (data, peer) = UnixStream::pair().unwrap();
        let (_tx, rx) = wake_pair().unwrap();

        drop(peer);
        let event = wait_readable_or_wake(data.as_raw_fd(), rx.fd()).unwrap();
        assert_eq!(event, PipeEvent::Readable);
    }
}
