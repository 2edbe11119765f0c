use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::error::Result;
use crate::fdio::FdIo;
use crate::traits::Transport;

/// Transport over an already-open byte-stream descriptor (pipe, socketpair,
/// inherited socket).
///
/// The safe constructor takes an [`OwnedFd`] and closes it on drop. Wrapping
/// a descriptor the caller keeps responsibility for goes through the unsafe
/// [`FdTransport::from_raw_fd`].
pub struct FdTransport {
    io: FdIo,
    // Present iff this transport closes the descriptor on drop.
    owned: Option<OwnedFd>,
}

impl FdTransport {
    /// Wrap an owned descriptor; it is closed when the transport drops.
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            io: FdIo::new(fd.as_raw_fd()),
            owned: Some(fd),
        }
    }

    /// Wrap a raw descriptor.
    ///
    /// With `owns` set, the descriptor is closed when the transport drops.
    ///
    /// # Safety
    ///
    /// `fd` must be an open byte-stream descriptor that stays valid for the
    /// transport's lifetime and, when `owns` is set, is not closed elsewhere.
    pub unsafe fn from_raw_fd(fd: RawFd, owns: bool) -> Self {
        Self {
            io: FdIo::new(fd),
            owned: owns.then(|| OwnedFd::from_raw_fd(fd)),
        }
    }

    /// Whether drop closes the descriptor.
    pub fn owns_fd(&self) -> bool {
        self.owned.is_some()
    }
}

impl Transport for FdTransport {
    fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        self.io.send_all(buf)
    }

    fn recv_all(&mut self, buf: &mut [u8]) -> Result<()> {
        self.io.recv_all(buf)
    }

    fn raw_fd(&self) -> RawFd {
        self.io.fd()
    }
}

impl std::fmt::Debug for FdTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdTransport")
            .field("fd", &self.io.fd())
            .field("owns", &self.owned.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    use crate::error::TransportError;

    use super::*;

    #[test]
    fn roundtrip_over_socketpair() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut tx = FdTransport::new(left.into());
        let mut rx = FdTransport::new(right.into());

        tx.send_all(b"datagram-ish").unwrap();

        let mut buf = [0u8; 12];
        rx.recv_all(&mut buf).unwrap();
        assert_eq!(&buf, b"datagram-ish");
    }

    #[test]
    fn owned_fd_closed_on_drop() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let tx = FdTransport::new(left.into());
        assert!(tx.owns_fd());
        drop(tx);

        // Peer observes EOF once the owned end is closed.
        let mut buf = [0u8; 1];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn borrowed_fd_left_open_on_drop() {
        let (left, right) = UnixStream::pair().unwrap();
        {
            // SAFETY: `left` outlives the transport and retains ownership.
            let transport = unsafe { FdTransport::from_raw_fd(left.as_raw_fd(), false) };
            assert!(!transport.owns_fd());
        }

        // Still writable after the transport dropped.
        let mut left = left;
        left.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        (&right).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
    }

    #[test]
    fn eof_after_peer_close() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(left);

        let mut rx = FdTransport::new(right.into());
        let mut buf = [0u8; 8];
        let err = rx.recv_all(&mut buf).unwrap_err();
        assert!(matches!(err, TransportError::Eof { remaining: 8 }));
    }
}
