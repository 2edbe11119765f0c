//! Exact-count read/write loops over a raw descriptor.
//!
//! Shared by the TCP and descriptor transports: both ultimately move bytes
//! through a Unix file descriptor with identical retry and end-of-stream
//! rules.

use std::io::ErrorKind;
use std::os::fd::RawFd;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Exact-count I/O over a borrowed descriptor.
///
/// Does not own the descriptor; the enclosing transport is responsible for
/// keeping it open for the lifetime of this value and closing it afterwards.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FdIo {
    fd: RawFd,
}

impl FdIo {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self { fd }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Write the entire buffer, retrying interrupted and would-block
    /// conditions after waiting for the descriptor to become writable.
    pub(crate) fn send_all(&self, buf: &[u8]) -> Result<()> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            // SAFETY: `remaining` is a valid readable slice for the provided
            // length, and `fd` is an open descriptor owned by the enclosing
            // transport.
            let written = unsafe {
                libc::write(
                    self.fd,
                    remaining.as_ptr().cast::<libc::c_void>(),
                    remaining.len(),
                )
            };

            if written > 0 {
                remaining = &remaining[written as usize..];
                continue;
            }
            if written == 0 {
                return Err(TransportError::Eof {
                    remaining: remaining.len(),
                });
            }

            let err = std::io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock => wait_ready(self.fd, libc::POLLOUT)?,
                _ => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    /// Fill the entire buffer, retrying interrupted and would-block
    /// conditions after waiting for the descriptor to become readable.
    ///
    /// A zero-byte read is end-of-stream and fails with the number of bytes
    /// still outstanding.
    pub(crate) fn recv_all(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let remaining = buf.len() - filled;
            // SAFETY: the target region is a valid writable slice of
            // `remaining` bytes, and `fd` is an open descriptor owned by the
            // enclosing transport.
            let read = unsafe {
                libc::read(
                    self.fd,
                    buf[filled..].as_mut_ptr().cast::<libc::c_void>(),
                    remaining,
                )
            };

            if read > 0 {
                filled += read as usize;
                continue;
            }
            if read == 0 {
                debug!(fd = self.fd, remaining, "end of stream");
                return Err(TransportError::Eof { remaining });
            }

            let err = std::io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock => wait_ready(self.fd, libc::POLLIN)?,
                _ => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }
}

/// Block until the descriptor reports the requested readiness event.
pub(crate) fn wait_ready(fd: RawFd, events: libc::c_short) -> Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        // SAFETY: `pfd` is a valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
        if rc == 1 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            continue;
        }
        return Err(TransportError::Io(err));
    }

    if pfd.revents & libc::POLLERR != 0 || pfd.revents & events == 0 {
        return Err(TransportError::Io(std::io::Error::other(
            "descriptor reported error while waiting for readiness",
        )));
    }
    Ok(())
}
