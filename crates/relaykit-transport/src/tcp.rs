use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::fdio::FdIo;
use crate::traits::Transport;

/// TCP socket transport.
///
/// Connects to a `host:port` address (or wraps an accepted stream) and
/// configures the socket for low-latency relay traffic: `TCP_NODELAY` on,
/// `SO_KEEPALIVE` on. Owns the stream; drop closes it.
pub struct TcpTransport {
    stream: TcpStream,
    io: FdIo,
}

impl TcpTransport {
    /// Connect to a listening peer (blocking).
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr, "connected to relay socket");
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream (e.g. from a listener's accept).
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        set_keepalive(&stream)?;
        let io = FdIo::new(stream.as_raw_fd());
        Ok(Self { stream, io })
    }

    /// The peer address, for diagnostics.
    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

impl Transport for TcpTransport {
    fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        self.io.send_all(buf)
    }

    fn recv_all(&mut self, buf: &mut [u8]) -> Result<()> {
        self.io.recv_all(buf)
    }

    fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}

fn set_keepalive(stream: &TcpStream) -> Result<()> {
    let enable: libc::c_int = 1;
    // SAFETY: `enable` is a valid c_int for the provided option length, and
    // the descriptor is an open TCP socket owned by `stream`.
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            (&enable as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}
