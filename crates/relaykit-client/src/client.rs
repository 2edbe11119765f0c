use std::borrow::Cow;
use std::os::fd::{OwnedFd, RawFd};

use bytes::{Bytes, BytesMut};
use relaykit_packet::{
    decode_packet, encode_packet, frame_size, pack_name, unpack_name, FrameHeader, Packet,
    DEFAULT_MTU, ENDPOINT_LEN, HEADER_SIZE,
};
use relaykit_transport::{FdTransport, TcpTransport, Transport, TransportError};
use tracing::{debug, error};

use crate::error::{ClientError, Failure, Result};

/// Per-client configuration, fixed at construction.
///
/// Replaces the process-wide mutable MTU of older relay implementations:
/// changing a config never affects already-constructed clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum total frame size (header + payload) this client will send or
    /// accept.
    pub mtu: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { mtu: DEFAULT_MTU }
    }
}

/// Receive-path state: headers and payloads are read in two phases so an
/// interrupted receive can be resumed without losing the header.
#[derive(Clone, Copy)]
enum ReadState {
    Idle,
    HeaderPending {
        raw: [u8; HEADER_SIZE],
        payload_len: usize,
    },
}

/// Header fields of a received packet, with the payload copied out into a
/// caller buffer. `length` is the packet's true payload length even when the
/// buffer was too small to hold all of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketMeta {
    pub type_tag: String,
    pub remote: String,
    pub local: String,
    pub length: usize,
}

/// A packet-oriented connection to a relay peer.
///
/// Owns exactly one transport. All operations are synchronous and may
/// block; sending and receiving keep separate buffers but share the sticky
/// failure state. Receiving requires `&mut self`, so overlapping receives on
/// one client cannot be expressed.
pub struct RelayClient {
    local: [u8; ENDPOINT_LEN],
    mtu: usize,
    transport: Box<dyn Transport>,
    read_state: ReadState,
    failed: Option<Failure>,
}

impl RelayClient {
    /// Connect to `addr` (`host:port`) and authenticate as `local`.
    ///
    /// An empty `local` name skips the authentication handshake entirely: no
    /// bytes are written before the first explicit send.
    pub fn connect(local: &str, addr: &str) -> Result<Self> {
        Self::connect_with_config(local, addr, &ClientConfig::default())
    }

    /// Connect with explicit configuration.
    pub fn connect_with_config(local: &str, addr: &str, config: &ClientConfig) -> Result<Self> {
        // Name validation happens before the socket is opened; an invalid
        // name must leave no partial state behind.
        let local = validate_name(local)?;
        let transport = TcpTransport::connect(addr)?;
        Self::from_parts(local, Box::new(transport), true, config)
    }

    /// Wrap an already-open descriptor, closing it when the client drops.
    ///
    /// `authenticate` controls whether the handshake runs (it is skipped
    /// regardless when `local` is empty).
    pub fn from_fd(local: &str, fd: OwnedFd, authenticate: bool) -> Result<Self> {
        Self::from_fd_with_config(local, fd, authenticate, &ClientConfig::default())
    }

    /// Wrap a descriptor with explicit configuration.
    pub fn from_fd_with_config(
        local: &str,
        fd: OwnedFd,
        authenticate: bool,
        config: &ClientConfig,
    ) -> Result<Self> {
        let local = validate_name(local)?;
        Self::from_parts(local, Box::new(FdTransport::new(fd)), authenticate, config)
    }

    /// Build a client over any transport.
    pub fn with_transport(
        local: &str,
        transport: Box<dyn Transport>,
        authenticate: bool,
        config: &ClientConfig,
    ) -> Result<Self> {
        let local = validate_name(local)?;
        Self::from_parts(local, transport, authenticate, config)
    }

    fn from_parts(
        local: [u8; ENDPOINT_LEN],
        transport: Box<dyn Transport>,
        authenticate: bool,
        config: &ClientConfig,
    ) -> Result<Self> {
        let mut client = Self {
            local,
            mtu: config.mtu,
            transport,
            read_state: ReadState::Idle,
            failed: None,
        };
        if authenticate && client.local[0] != 0 {
            client.authenticate()?;
        }
        Ok(client)
    }

    /// Send an AUTH packet carrying our name and require an AUTH reply.
    fn authenticate(&mut self) -> Result<()> {
        let name = unpack_name(&self.local).into_owned();
        debug!(%name, "authenticating relay client");

        if let Err(err) = self.send_data("AUTH", "", name.as_bytes()) {
            self.fail(Failure::Init);
            error!(%name, %err, "failed to send authentication packet");
            return Err(ClientError::Auth(format!("send failed: {err}")));
        }
        let response = match self.recv_packet() {
            Ok(packet) => packet,
            Err(err) => {
                self.fail(Failure::Init);
                error!(%name, %err, "failed to receive authentication response");
                return Err(ClientError::Auth(format!("no acknowledgement: {err}")));
            }
        };
        if !response.type_is("AUTH") {
            self.fail(Failure::Init);
            return Err(ClientError::Auth(format!(
                "unexpected response type '{}'",
                response.type_str()
            )));
        }
        Ok(())
    }

    /// This client's endpoint name (empty for anonymous clients).
    pub fn local_name(&self) -> Cow<'_, str> {
        unpack_name(&self.local)
    }

    /// The MTU fixed at construction.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// The latched failure, if any.
    pub fn failure(&self) -> Option<Failure> {
        self.failed
    }

    /// The transport's descriptor, for readiness multiplexing.
    pub fn raw_fd(&self) -> RawFd {
        self.transport.raw_fd()
    }

    fn check_usable(&self) -> Result<()> {
        match self.failed {
            Some(failure) => Err(ClientError::Failed(failure)),
            None => Ok(()),
        }
    }

    // First failure wins; later ones keep the original reason.
    fn fail(&mut self, failure: Failure) {
        self.failed.get_or_insert(failure);
    }

    /// Send a text payload (without any terminator).
    pub fn send_text(&mut self, type_tag: &str, remote: &str, text: &str) -> Result<()> {
        self.send_data(type_tag, remote, text.as_bytes())
    }

    /// Build and send a packet, stamping `local` with this client's name.
    pub fn send_data(&mut self, type_tag: &str, remote: &str, data: &[u8]) -> Result<()> {
        let packet = Packet {
            type_tag: pack_name(type_tag),
            remote: pack_name(remote),
            local: self.local,
            payload: Bytes::copy_from_slice(data),
        };
        self.send(&packet)
    }

    /// Serialize and send a packet as-is (the sender name is not altered).
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        self.check_usable()?;
        let mut frame = BytesMut::with_capacity(packet.wire_size());
        encode_packet(packet, &mut frame)?;
        self.send_frame(&frame)
    }

    /// Send an already-serialized frame.
    ///
    /// The frame is checked against the MTU before any I/O; a violation
    /// latches [`Failure::SendTooLarge`] without touching the transport.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.check_usable()?;
        if frame.len() > self.mtu {
            self.fail(Failure::SendTooLarge);
            error!(
                size = frame.len(),
                mtu = self.mtu,
                "attempted to send frame larger than client mtu"
            );
            return Err(ClientError::SendTooLarge {
                size: frame.len(),
                mtu: self.mtu,
            });
        }
        debug!(bytes = frame.len(), "writing frame");
        if let Err(err) = self.transport.send_all(frame) {
            self.fail(Failure::Transport);
            error!(%err, bytes = frame.len(), "relay write failed");
            return Err(err.into());
        }
        Ok(())
    }

    /// Phase 1: read and decode the fixed header, or reuse one left pending
    /// by an earlier interrupted receive.
    fn read_header(&mut self) -> Result<([u8; HEADER_SIZE], usize)> {
        if let ReadState::HeaderPending { raw, payload_len } = self.read_state {
            return Ok((raw, payload_len));
        }

        let mut raw = [0u8; HEADER_SIZE];
        if let Err(err) = self.transport.recv_all(&mut raw) {
            // EOF with the whole header outstanding is a clean disconnect on
            // a frame boundary; anything else is a transport failure.
            let clean =
                matches!(err, TransportError::Eof { remaining } if remaining == HEADER_SIZE);
            self.fail(Failure::Transport);
            if clean {
                debug!("peer disconnected");
                return Err(ClientError::Disconnected);
            }
            error!(%err, "failed to read packet header");
            return Err(err.into());
        }

        let header = FrameHeader::decode(&raw);
        self.read_state = ReadState::HeaderPending {
            raw,
            payload_len: header.payload_len,
        };
        Ok((raw, header.payload_len))
    }

    /// Phase 2: read the payload for the pending header and reassemble the
    /// full frame. Clears the pending state on success.
    fn read_payload(&mut self, raw: [u8; HEADER_SIZE], payload_len: usize) -> Result<Bytes> {
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload_len);
        frame.extend_from_slice(&raw);
        frame.resize(HEADER_SIZE + payload_len, 0);

        if payload_len > 0 {
            if let Err(err) = self.transport.recv_all(&mut frame[HEADER_SIZE..]) {
                self.fail(Failure::Transport);
                error!(%err, "failed to read packet payload");
                return Err(err.into());
            }
        }

        self.read_state = ReadState::Idle;
        Ok(frame.freeze())
    }

    /// Receive one complete serialized frame.
    ///
    /// The inbound MTU check runs between the header and payload phases: an
    /// oversized frame is rejected, and [`Failure::RecvTooLarge`] latched,
    /// before a single payload byte is read.
    pub fn recv_frame(&mut self) -> Result<Bytes> {
        self.check_usable()?;
        let (raw, payload_len) = self.read_header()?;

        let total = frame_size(payload_len);
        if total > self.mtu {
            self.fail(Failure::RecvTooLarge);
            error!(
                size = total,
                mtu = self.mtu,
                "attempted to receive frame larger than client mtu"
            );
            return Err(ClientError::RecvTooLarge {
                size: total,
                mtu: self.mtu,
            });
        }

        self.read_payload(raw, payload_len)
    }

    /// Receive one packet. The payload borrows the frame's allocation.
    pub fn recv_packet(&mut self) -> Result<Packet> {
        Ok(decode_packet(self.recv_frame()?)?)
    }

    /// Receive one packet and copy its payload into `buf`.
    ///
    /// The copy is truncated to `buf.len()`; the returned
    /// [`PacketMeta::length`] always reports the packet's true payload
    /// length, so callers can detect truncation.
    pub fn recv_data(&mut self, buf: &mut [u8]) -> Result<PacketMeta> {
        let packet = self.recv_packet()?;
        let copied = packet.payload.len().min(buf.len());
        buf[..copied].copy_from_slice(&packet.payload[..copied]);
        Ok(PacketMeta {
            type_tag: packet.type_str().into_owned(),
            remote: packet.remote_str().into_owned(),
            local: packet.local_str().into_owned(),
            length: packet.payload.len(),
        })
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("local", &self.local_name())
            .field("mtu", &self.mtu)
            .field("failed", &self.failed)
            .finish()
    }
}

fn validate_name(local: &str) -> Result<[u8; ENDPOINT_LEN]> {
    if local.len() > ENDPOINT_LEN {
        return Err(ClientError::NameTooLong {
            len: local.len(),
            max: ENDPOINT_LEN,
        });
    }
    Ok(pack_name(local))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::os::fd::RawFd;
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;

    /// Scripted transport: hands out queued bytes on receive and records
    /// everything sent into a shared buffer the test keeps a handle to.
    #[derive(Default)]
    struct ScriptedTransport {
        incoming: VecDeque<u8>,
        sent: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn with_frames(packets: &[Packet]) -> Self {
            let mut incoming = VecDeque::new();
            for packet in packets {
                incoming.extend(packet.encode().unwrap());
            }
            Self {
                incoming,
                ..Self::default()
            }
        }

        fn sent_handle(&self) -> std::sync::Arc<std::sync::Mutex<Vec<u8>>> {
            self.sent.clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send_all(&mut self, buf: &[u8]) -> relaykit_transport::Result<()> {
            self.sent.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }

        fn recv_all(&mut self, buf: &mut [u8]) -> relaykit_transport::Result<()> {
            for (i, slot) in buf.iter_mut().enumerate() {
                match self.incoming.pop_front() {
                    Some(byte) => *slot = byte,
                    None => {
                        return Err(TransportError::Eof {
                            remaining: buf.len() - i,
                        })
                    }
                }
            }
            Ok(())
        }

        fn raw_fd(&self) -> RawFd {
            -1
        }
    }

    fn anonymous(transport: ScriptedTransport) -> RelayClient {
        RelayClient::with_transport("", Box::new(transport), false, &ClientConfig::default())
            .unwrap()
    }

    #[test]
    fn send_stamps_local_name() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let mut sender = RelayClient::from_fd("sender", ours.into(), false).unwrap();
        let mut receiver = RelayClient::from_fd("", theirs.into(), false).unwrap();

        sender.send_text("DATA", "peer", "payload").unwrap();

        let packet = receiver.recv_packet().unwrap();
        assert_eq!(packet.local_str(), "sender");
        assert_eq!(packet.remote_str(), "peer");
        assert_eq!(packet.payload.as_ref(), b"payload");
    }

    #[test]
    fn recv_packet_roundtrip() {
        let expected = Packet::new("DATA", "you", "me", &b"hello"[..]);
        let mut client = anonymous(ScriptedTransport::with_frames(&[expected.clone()]));

        let packet = client.recv_packet().unwrap();
        assert_eq!(packet, expected);
    }

    #[test]
    fn name_too_long_fails_before_transport() {
        let err = RelayClient::connect("ninechars!", "127.0.0.1:1").unwrap_err();
        assert!(matches!(err, ClientError::NameTooLong { len: 10, max: 8 }));
    }

    #[test]
    fn outbound_mtu_violation_is_sticky_and_sends_nothing() {
        let transport = ScriptedTransport::default();
        let sent = transport.sent_handle();
        let config = ClientConfig {
            mtu: frame_size(4),
        };
        let mut client =
            RelayClient::with_transport("", Box::new(transport), false, &config).unwrap();

        let err = client.send_text("DATA", "", "five!").unwrap_err();
        assert!(matches!(err, ClientError::SendTooLarge { .. }));
        assert_eq!(client.failure(), Some(Failure::SendTooLarge));
        assert!(sent.lock().unwrap().is_empty());

        // Every further operation short-circuits, even a legal one.
        let err = client.send_text("DATA", "", "ok").unwrap_err();
        assert!(matches!(err, ClientError::Failed(Failure::SendTooLarge)));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn inbound_mtu_violation_rejected_before_payload_read() {
        // Only the header is scripted; reading any payload byte would hit
        // EOF and turn the error into Transport instead of RecvTooLarge.
        let oversized = Packet::new("DATA", "", "", vec![0u8; 64]);
        let mut wire = oversized.encode().unwrap().to_vec();
        wire.truncate(HEADER_SIZE);

        let transport = ScriptedTransport {
            incoming: wire.into_iter().collect(),
            ..ScriptedTransport::default()
        };
        let config = ClientConfig {
            mtu: frame_size(8),
        };
        let mut client =
            RelayClient::with_transport("", Box::new(transport), false, &config).unwrap();

        let err = client.recv_frame().unwrap_err();
        assert!(matches!(err, ClientError::RecvTooLarge { .. }));
        assert_eq!(client.failure(), Some(Failure::RecvTooLarge));
    }

    #[test]
    fn clean_eof_is_disconnected() {
        let mut client = anonymous(ScriptedTransport::default());
        let err = client.recv_packet().unwrap_err();
        assert!(matches!(err, ClientError::Disconnected));

        // Disconnect latches the transport failure.
        let err = client.recv_packet().unwrap_err();
        assert!(matches!(err, ClientError::Failed(Failure::Transport)));
    }

    #[test]
    fn eof_mid_header_is_transport_error() {
        let transport = ScriptedTransport {
            incoming: b"DAT".iter().copied().collect(),
            ..ScriptedTransport::default()
        };
        let mut client = anonymous(transport);
        let err = client.recv_packet().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Eof { .. })
        ));
    }

    #[test]
    fn recv_data_reports_true_length_on_truncation() {
        let packet = Packet::new("DATA", "dest", "src", &b"longer than buf"[..]);
        let mut client = anonymous(ScriptedTransport::with_frames(&[packet]));

        let mut buf = [0u8; 6];
        let meta = client.recv_data(&mut buf).unwrap();

        assert_eq!(meta.type_tag, "DATA");
        assert_eq!(meta.remote, "dest");
        assert_eq!(meta.local, "src");
        assert_eq!(meta.length, 15);
        assert_eq!(&buf, b"longer");
    }

    #[test]
    fn authenticates_over_socketpair() {
        let (ours, theirs) = UnixStream::pair().unwrap();

        let server = thread::spawn(move || {
            let mut server =
                RelayClient::from_fd("", theirs.into(), false).unwrap();
            let hello = server.recv_packet().unwrap();
            assert!(hello.type_is("AUTH"));
            assert_eq!(hello.payload.as_ref(), b"alice");
            assert_eq!(hello.local_str(), "alice");
            server.send_data("AUTH", "alice", b"welcome").unwrap();
        });

        let client = RelayClient::from_fd("alice", ours.into(), true).unwrap();
        assert_eq!(client.local_name(), "alice");
        server.join().unwrap();
    }

    #[test]
    fn nack_response_fails_authentication() {
        let (ours, theirs) = UnixStream::pair().unwrap();

        let server = thread::spawn(move || {
            let mut server = RelayClient::from_fd("", theirs.into(), false).unwrap();
            let _hello = server.recv_packet().unwrap();
            server.send_data("NACK", "", b"go away").unwrap();
        });

        let err = RelayClient::from_fd("mallory", ours.into(), true).unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
        server.join().unwrap();
    }

    #[test]
    fn empty_name_sends_no_handshake_bytes() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();

        let mut client = RelayClient::from_fd("", ours.into(), true).unwrap();
        client.send_text("TEST", "peer", "first").unwrap();

        // The very first frame on the wire is the explicit send, proving no
        // handshake traffic preceded it.
        let mut raw = vec![0u8; frame_size(5)];
        theirs.read_exact(&mut raw).unwrap();
        let packet = decode_packet(Bytes::from(raw)).unwrap();
        assert!(packet.type_is("TEST"));
        assert_eq!(packet.payload.as_ref(), b"first");
    }

    #[test]
    fn payload_eof_is_a_mid_frame_transport_error() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut client = RelayClient::from_fd("", ours.into(), false).unwrap();

        // Deliver only the header, then close: phase 2 fails mid-frame.
        let full = Packet::new("DATA", "", "", &b"body"[..]).encode().unwrap();
        theirs.write_all(&full[..HEADER_SIZE]).unwrap();
        theirs.shutdown(std::net::Shutdown::Write).unwrap();

        let err = client.recv_packet().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Eof { remaining: 4 })
        ));
    }

    #[test]
    fn send_frame_forwards_preserialized_bytes() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut client = RelayClient::from_fd("", ours.into(), false).unwrap();

        let frame = Packet::new("FWD", "b", "a", &b"relayed"[..]).encode().unwrap();
        client.send_frame(&frame).unwrap();

        let mut raw = vec![0u8; frame.len()];
        theirs.read_exact(&mut raw).unwrap();
        assert_eq!(raw, frame.as_ref());
    }
}
