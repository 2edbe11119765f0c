/// Terminal failure reasons a client latches on.
///
/// Once set, every further operation on the client short-circuits with
/// [`ClientError::Failed`] without touching the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// Construction or authentication failed.
    #[error("initialization failed")]
    Init,

    /// An outbound frame exceeded the client's MTU.
    #[error("outbound frame exceeded mtu")]
    SendTooLarge,

    /// An inbound frame declared a size exceeding the client's MTU.
    #[error("inbound frame exceeded mtu")]
    RecvTooLarge,

    /// The transport failed or the stream ended.
    #[error("transport failed")]
    Transport,
}

/// Errors that can occur in relay client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The endpoint name exceeds the wire format's fixed width.
    #[error("endpoint name too long ({len} bytes, max {max})")]
    NameTooLong { len: usize, max: usize },

    /// The authentication handshake was rejected or malformed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] relaykit_transport::TransportError),

    /// Wire-format error.
    #[error("packet error: {0}")]
    Packet(#[from] relaykit_packet::PacketError),

    /// An outbound frame was rejected before any I/O.
    #[error("outbound frame too large ({size} bytes, mtu {mtu})")]
    SendTooLarge { size: usize, mtu: usize },

    /// An inbound frame was rejected before its payload was read.
    #[error("inbound frame too large ({size} bytes, mtu {mtu})")]
    RecvTooLarge { size: usize, mtu: usize },

    /// The peer closed the stream cleanly on a frame boundary.
    #[error("peer disconnected")]
    Disconnected,

    /// The client latched a failure earlier and refuses further work.
    #[error("client unusable after earlier failure: {0}")]
    Failed(Failure),
}

pub type Result<T> = std::result::Result<T, ClientError>;
