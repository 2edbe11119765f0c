//! Wire format for typed, addressed relay packets.
//!
//! Every packet is framed with a fixed 24-byte header:
//! - A 4-byte packet type (e.g. "AUTH", "DATA"), NUL padded
//! - An 8-byte recipient endpoint name, NUL padded
//! - An 8-byte sender endpoint name, NUL padded
//! - A 4-byte big-endian payload length
//!
//! followed by exactly `length` payload bytes. No delimiters, no trailing
//! padding.

pub mod codec;
pub mod error;

pub use codec::{
    decode_packet, encode_packet, frame_size, pack_name, unpack_name, FrameHeader, Packet,
    DEFAULT_MTU, ENDPOINT_LEN, HEADER_SIZE, TYPE_LEN,
};
pub use error::{PacketError, Result};
