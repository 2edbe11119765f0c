/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The payload exceeds the wire format's length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The input ended before a complete header was available.
    #[error("truncated frame header ({len} bytes, need {need})")]
    TruncatedHeader { len: usize, need: usize },

    /// The declared payload length disagrees with the bytes available.
    #[error("frame length mismatch (declared {declared} payload bytes, got {actual})")]
    LengthMismatch { declared: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, PacketError>;
