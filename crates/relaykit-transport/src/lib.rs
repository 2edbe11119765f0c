//! Byte-stream transport abstraction for relay clients.
//!
//! Provides a unified interface over the two ways relay traffic reaches a
//! process:
//! - TCP sockets (connect or accept side)
//! - Already-open byte-stream descriptors (pipes, socketpairs, inherited fds)
//!
//! This is the lowest layer of relaykit. The [`Transport`] trait carries
//! exact-count send/receive semantics: a call returns only once the full
//! byte count has been transferred, or a fatal condition was hit.
//! Interrupted and would-block conditions are retried internally after
//! waiting for readiness.

pub mod error;
pub mod fd;
mod fdio;
pub mod tcp;
pub mod traits;
pub mod wake;

pub use error::{Result, TransportError};
pub use fd::FdTransport;
pub use tcp::TcpTransport;
pub use traits::Transport;
pub use wake::{wait_readable_or_wake, wake_pair, PipeEvent, WakeReceiver, WakeSender};
