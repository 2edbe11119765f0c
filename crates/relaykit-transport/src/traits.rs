use std::os::fd::RawFd;

use crate::error::Result;

/// A connected byte-stream transport with exact-count transfer semantics.
///
/// Implementations are constructed connected (initialization is the
/// constructor) and release their resources on drop. `send_all` and
/// `recv_all` return only once the full byte count has been transferred;
/// interrupted and would-block conditions are retried internally, and a
/// premature end-of-stream is a hard error.
pub trait Transport: Send {
    /// Write the entire buffer.
    fn send_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Fill the entire buffer.
    fn recv_all(&mut self, buf: &mut [u8]) -> Result<()>;

    /// The underlying descriptor, for readiness multiplexing.
    ///
    /// Only valid while the transport is alive.
    fn raw_fd(&self) -> RawFd;
}
