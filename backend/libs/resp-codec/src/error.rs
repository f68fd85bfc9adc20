//! Error types for RESP decoding

use thiserror::Error;

/// Errors raised while decoding a reply stream.
///
/// Every variant means the byte stream is corrupt; the decoder cannot
/// resynchronise and the connection should be dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// First byte of a frame is not a known type marker
    #[error("Invalid frame marker: 0x{0:02x}")]
    InvalidMarker(u8),

    /// Length prefix of a bulk string or array is not a valid integer
    #[error("Invalid length prefix: {0:?}")]
    InvalidLength(String),

    /// Payload of an integer reply is not a valid integer
    #[error("Invalid integer reply: {0:?}")]
    InvalidInteger(String),

    /// Bulk string declares more bytes than the decoder accepts
    #[error("Bulk string of {len} bytes exceeds limit of {limit} bytes")]
    BulkTooLarge { len: usize, limit: usize },

    /// Bulk string payload is not followed by CRLF
    #[error("Bulk string missing CRLF terminator")]
    MissingTerminator,

    /// Header line grew past the inline limit without a CRLF
    #[error("Header line exceeds {0} bytes without terminator")]
    LineTooLong(usize),

    /// Arrays nested deeper than the decoder accepts
    #[error("Array nesting exceeds depth {0}")]
    NestingTooDeep(usize),
}
