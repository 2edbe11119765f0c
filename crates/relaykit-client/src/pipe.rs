//! Background forwarder between two descriptors.
//!
//! A pipe owns two anonymous relay clients and a worker thread that loops:
//! wait for input or cancellation, receive a packet, offer it to the tap,
//! and forward it if accepted. Packets flow strictly one at a time, so FIFO
//! order is preserved end to end.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use relaykit_packet::Packet;
use relaykit_transport::{
    wait_readable_or_wake, wake_pair, FdTransport, PipeEvent, TransportError, WakeReceiver,
    WakeSender,
};
use tracing::{debug, error};

use crate::client::{ClientConfig, RelayClient};
use crate::error::{ClientError, Result};

/// Filter/mutator applied to each packet before forwarding.
///
/// Returning `true` forwards the (possibly mutated) packet; `false` drops
/// it. The tap may rewrite the type, endpoints, and payload in place.
pub type Tap = Box<dyn FnMut(&mut Packet) -> bool + Send>;

/// Why a pipe's worker stopped early.
///
/// A clean disconnect of the input is a normal stop and is not recorded.
#[derive(Debug)]
pub enum PipeFailure {
    /// Receiving from the input client failed.
    Recv(ClientError),
    /// Forwarding to the output client failed.
    Send(ClientError),
}

/// A running packet forwarder.
///
/// Dropping the pipe signals cancellation and joins the worker before
/// returning, so the pipe can never be destroyed while its worker is still
/// runnable.
pub struct RelayPipe {
    wake: WakeSender,
    worker: Option<JoinHandle<()>>,
    failure: Arc<Mutex<Option<PipeFailure>>>,
}

impl RelayPipe {
    /// Forward packets read from `input` to `output`, filtered through
    /// `tap`. Both descriptors are owned by the pipe and closed when it is
    /// destroyed.
    pub fn new(input: OwnedFd, output: OwnedFd, tap: Option<Tap>) -> Result<Self> {
        Self::with_config(input, output, tap, &ClientConfig::default())
    }

    /// Forward with explicit client configuration (MTU for both ends).
    pub fn with_config(
        input: OwnedFd,
        output: OwnedFd,
        tap: Option<Tap>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let input_fd = input.as_raw_fd();
        let reader = RelayClient::from_fd_with_config("", input, false, config)?;
        let writer = RelayClient::from_fd_with_config("", output, false, config)?;
        Self::from_clients(reader, writer, input_fd, tap)
    }

    /// Forward between raw descriptors.
    ///
    /// With `owns` set, both descriptors are closed on destruction.
    ///
    /// # Safety
    ///
    /// Both descriptors must be open byte-stream descriptors that stay valid
    /// for the pipe's lifetime and, when `owns` is set, are not closed
    /// elsewhere.
    pub unsafe fn from_raw_fds(
        fd_in: RawFd,
        fd_out: RawFd,
        owns: bool,
        tap: Option<Tap>,
    ) -> Result<Self> {
        let config = ClientConfig::default();
        let reader = RelayClient::with_transport(
            "",
            Box::new(FdTransport::from_raw_fd(fd_in, owns)),
            false,
            &config,
        )?;
        let writer = RelayClient::with_transport(
            "",
            Box::new(FdTransport::from_raw_fd(fd_out, owns)),
            false,
            &config,
        )?;
        Self::from_clients(reader, writer, fd_in, tap)
    }

    fn from_clients(
        reader: RelayClient,
        writer: RelayClient,
        input_fd: RawFd,
        tap: Option<Tap>,
    ) -> Result<Self> {
        let (wake, wake_rx) = wake_pair()?;
        let failure = Arc::new(Mutex::new(None));

        let worker_failure = Arc::clone(&failure);
        let worker = thread::Builder::new()
            .name("relay-pipe".into())
            .spawn(move || worker_loop(reader, writer, tap, wake_rx, input_fd, worker_failure))
            .map_err(|e| ClientError::Transport(TransportError::Io(e)))?;

        Ok(Self {
            wake,
            worker: Some(worker),
            failure,
        })
    }

    /// Why the worker stopped, if it failed. `None` while it is running or
    /// after a clean stop.
    pub fn take_failure(&self) -> Option<PipeFailure> {
        lock_failure(&self.failure).take()
    }

    /// Cancel and tear down, waiting for the worker to exit.
    ///
    /// Equivalent to dropping the pipe; provided for call sites that want
    /// the shutdown to be visible.
    pub fn shutdown(self) {}
}

impl Drop for RelayPipe {
    fn drop(&mut self) {
        self.wake.wake();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    mut reader: RelayClient,
    mut writer: RelayClient,
    mut tap: Option<Tap>,
    wake_rx: WakeReceiver,
    input_fd: RawFd,
    failure: Arc<Mutex<Option<PipeFailure>>>,
) {
    debug!("pipe worker started");
    loop {
        match wait_readable_or_wake(input_fd, wake_rx.fd()) {
            Ok(PipeEvent::Woken) => {
                debug!("pipe worker stopping on cancellation");
                break;
            }
            Ok(PipeEvent::Readable) => {}
            Err(err) => {
                error!(%err, "pipe readiness wait failed");
                *lock_failure(&failure) = Some(PipeFailure::Recv(err.into()));
                break;
            }
        }

        let mut packet = match reader.recv_packet() {
            Ok(packet) => packet,
            Err(ClientError::Disconnected) => {
                debug!("pipe input closed");
                break;
            }
            Err(err) => {
                error!(%err, "pipe failed to receive packet");
                *lock_failure(&failure) = Some(PipeFailure::Recv(err));
                break;
            }
        };

        let accepted = match tap.as_mut() {
            Some(tap) => tap(&mut packet),
            None => true,
        };
        if !accepted {
            debug!("pipe rejected a packet");
            continue;
        }

        // Forwarding preserves the packet's own sender name.
        if let Err(err) = writer.send(&packet) {
            error!(%err, "pipe failed to forward packet");
            *lock_failure(&failure) = Some(PipeFailure::Send(err));
            break;
        }
    }
    debug!("pipe worker exited");
}

fn lock_failure(
    failure: &Mutex<Option<PipeFailure>>,
) -> std::sync::MutexGuard<'_, Option<PipeFailure>> {
    failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
