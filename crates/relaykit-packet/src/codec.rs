use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PacketError, Result};

/// Width of the packet type field on the wire.
pub const TYPE_LEN: usize = 4;

/// Width of an endpoint name field on the wire.
pub const ENDPOINT_LEN: usize = 8;

/// Frame header: type (4) + remote (8) + local (8) + length (4) = 24 bytes.
pub const HEADER_SIZE: usize = TYPE_LEN + 2 * ENDPOINT_LEN + 4;

/// Default maximum total frame size (header + payload): 16 MiB.
///
/// Clients snapshot their MTU from their config at construction time; this
/// constant is only the default for configs that don't override it.
pub const DEFAULT_MTU: usize = 16 * 1024 * 1024;

/// A typed, addressed relay packet.
///
/// Name fields are fixed-width and NUL padded, exactly as they appear on the
/// wire; constructors silently truncate longer names. The payload is an
/// owned, reference-counted [`Bytes`] — packets decoded from the wire share
/// the allocation that held the raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet purpose, e.g. "AUTH" or "DATA".
    pub type_tag: [u8; TYPE_LEN],
    /// Name of the intended recipient endpoint (may be empty).
    pub remote: [u8; ENDPOINT_LEN],
    /// Name of the sending endpoint (may be empty).
    pub local: [u8; ENDPOINT_LEN],
    /// The message payload.
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet. Names longer than their wire width are truncated.
    pub fn new(
        type_tag: &str,
        remote: &str,
        local: &str,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            type_tag: pack_name(type_tag),
            remote: pack_name(remote),
            local: pack_name(local),
            payload: payload.into(),
        }
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize into a freshly allocated buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_packet(self, &mut buf)?;
        Ok(buf.freeze())
    }

    /// True if the packet type equals `type_tag` (after fixed-width padding).
    pub fn type_is(&self, type_tag: &str) -> bool {
        self.type_tag == pack_name::<TYPE_LEN>(type_tag)
    }

    /// Packet type as text, lossily decoded and trimmed of padding.
    pub fn type_str(&self) -> Cow<'_, str> {
        unpack_name(&self.type_tag)
    }

    /// Recipient endpoint name as text, lossily decoded and trimmed.
    pub fn remote_str(&self) -> Cow<'_, str> {
        unpack_name(&self.remote)
    }

    /// Sender endpoint name as text, lossily decoded and trimmed.
    pub fn local_str(&self) -> Cow<'_, str> {
        unpack_name(&self.local)
    }

    /// Replace the payload (used by pipe taps mutating packets in flight).
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }
}

/// Copy a name into its fixed wire width, NUL padding or truncating.
pub fn pack_name<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let src = name.as_bytes();
    let len = src.len().min(N);
    out[..len].copy_from_slice(&src[..len]);
    out
}

/// Decode a fixed-width name field, trimming trailing NUL padding.
pub fn unpack_name(field: &[u8]) -> Cow<'_, str> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end])
}

/// Decoded fixed-width frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub type_tag: [u8; TYPE_LEN],
    pub remote: [u8; ENDPOINT_LEN],
    pub local: [u8; ENDPOINT_LEN],
    pub payload_len: usize,
}

impl FrameHeader {
    /// Decode the fixed header. The length field is big-endian on the wire.
    pub fn decode(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut type_tag = [0u8; TYPE_LEN];
        let mut remote = [0u8; ENDPOINT_LEN];
        let mut local = [0u8; ENDPOINT_LEN];
        type_tag.copy_from_slice(&raw[..TYPE_LEN]);
        remote.copy_from_slice(&raw[TYPE_LEN..TYPE_LEN + ENDPOINT_LEN]);
        local.copy_from_slice(&raw[TYPE_LEN + ENDPOINT_LEN..TYPE_LEN + 2 * ENDPOINT_LEN]);
        let payload_len =
            u32::from_be_bytes(raw[HEADER_SIZE - 4..].try_into().unwrap()) as usize;
        Self {
            type_tag,
            remote,
            local,
            payload_len,
        }
    }

    /// Total frame size this header declares (header + payload).
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }
}

/// Number of bytes a frame with `payload_len` payload bytes occupies.
pub fn frame_size(payload_len: usize) -> usize {
    HEADER_SIZE + payload_len
}

/// Encode a packet into the wire format, appending to `dst`.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    if packet.payload.len() > u32::MAX as usize {
        return Err(PacketError::PayloadTooLarge {
            size: packet.payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(packet.wire_size());
    dst.put_slice(&packet.type_tag);
    dst.put_slice(&packet.remote);
    dst.put_slice(&packet.local);
    dst.put_u32(packet.payload.len() as u32);
    dst.put_slice(&packet.payload);
    Ok(())
}

/// Decode one complete frame.
///
/// The input must hold exactly one frame: a declared length that disagrees
/// with the bytes available — short or long — is a hard error, not a partial
/// read. The returned packet's payload borrows `frame`'s allocation.
pub fn decode_packet(frame: Bytes) -> Result<Packet> {
    if frame.len() < HEADER_SIZE {
        return Err(PacketError::TruncatedHeader {
            len: frame.len(),
            need: HEADER_SIZE,
        });
    }

    let raw: &[u8; HEADER_SIZE] = frame[..HEADER_SIZE].try_into().unwrap();
    let header = FrameHeader::decode(raw);

    let actual = frame.len() - HEADER_SIZE;
    if actual != header.payload_len {
        return Err(PacketError::LengthMismatch {
            declared: header.payload_len,
            actual,
        });
    }

    Ok(Packet {
        type_tag: header.type_tag,
        remote: header.remote,
        local: header.local,
        payload: frame.slice(HEADER_SIZE..),
    })
}
