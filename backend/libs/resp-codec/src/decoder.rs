//! Buffered incremental decoder

use crate::error::DecodeError;
use crate::frame::Frame;
use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

/// Largest bulk string accepted by default (matches the Redis proto-max-bulk-len default).
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest header line (type marker + length/simple payload) before giving up.
pub const MAX_INLINE_LEN: usize = 64 * 1024;

const MAX_NESTING_DEPTH: usize = 32;

/// Incremental RESP2 decoder.
///
/// Bytes are appended with [`feed`](RespDecoder::feed) in chunks of any size;
/// [`try_decode`](RespDecoder::try_decode) yields one complete frame at a
/// time and leaves partial frames buffered until more bytes arrive.
#[derive(Debug)]
pub struct RespDecoder {
    buffer: BytesMut,
    max_bulk_len: usize,
}

impl Default for RespDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RespDecoder {
    pub fn new() -> Self {
        Self::with_max_bulk_len(DEFAULT_MAX_BULK_LEN)
    }

    /// Create a decoder rejecting bulk strings longer than `max_bulk_len`.
    pub fn with_max_bulk_len(max_bulk_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_bulk_len,
        }
    }

    /// Append raw bytes read from the connection.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet consumed by a decoded frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete frame; the
    /// buffered bytes are kept for the next call. Bytes are only consumed when
    /// a whole frame (including every nested element) is available.
    pub fn try_decode(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match parse_frame(&self.buffer, 0, self.max_bulk_len, 0)? {
            Some((frame, consumed)) => {
                self.buffer.advance(consumed);
                trace!(
                    consumed,
                    remaining = self.buffer.len(),
                    "Decoded reply frame"
                );
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

/// Parse one frame starting at `pos`; returns the frame and the offset just past it.
fn parse_frame(
    src: &[u8],
    pos: usize,
    max_bulk_len: usize,
    depth: usize,
) -> Result<Option<(Frame, usize)>, DecodeError> {
    let Some(&marker) = src.get(pos) else {
        return Ok(None);
    };
    if !matches!(marker, b'+' | b'-' | b':' | b'$' | b'*') {
        return Err(DecodeError::InvalidMarker(marker));
    }
    let Some((line, next)) = read_line(src, pos + 1)? else {
        return Ok(None);
    };

    match marker {
        b'+' => Ok(Some((
            Frame::Simple(String::from_utf8_lossy(line).into_owned()),
            next,
        ))),
        b'-' => Ok(Some((
            Frame::Error(String::from_utf8_lossy(line).into_owned()),
            next,
        ))),
        b':' => {
            let value = parse_int(line).ok_or_else(|| {
                DecodeError::InvalidInteger(String::from_utf8_lossy(line).into_owned())
            })?;
            Ok(Some((Frame::Integer(value), next)))
        }
        b'$' => {
            let Some(len) = parse_length(line)? else {
                return Ok(Some((Frame::Null, next)));
            };
            if len > max_bulk_len {
                return Err(DecodeError::BulkTooLarge {
                    len,
                    limit: max_bulk_len,
                });
            }

            let end = next + len;
            if src.len() < end + 2 {
                return Ok(None);
            }
            if &src[end..end + 2] != b"\r\n" {
                return Err(DecodeError::MissingTerminator);
            }

            Ok(Some((
                Frame::Bulk(Bytes::copy_from_slice(&src[next..end])),
                end + 2,
            )))
        }
        b'*' => {
            let Some(len) = parse_length(line)? else {
                return Ok(Some((Frame::Null, next)));
            };
            if depth >= MAX_NESTING_DEPTH {
                return Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH));
            }

            // Each element needs at least 3 bytes; cap the pre-allocation by what is buffered.
            let mut items = Vec::with_capacity(len.min(src.len().saturating_sub(next) / 3));
            let mut cursor = next;
            for _ in 0..len {
                match parse_frame(src, cursor, max_bulk_len, depth + 1)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }

            Ok(Some((Frame::Array(items), cursor)))
        }
        other => Err(DecodeError::InvalidMarker(other)),
    }
}

/// Find the CRLF-terminated line starting at `start`.
fn read_line(src: &[u8], start: usize) -> Result<Option<(&[u8], usize)>, DecodeError> {
    let rest = src.get(start..).unwrap_or_default();

    match rest.windows(2).position(|w| w == b"\r\n") {
        Some(idx) => Ok(Some((&rest[..idx], start + idx + 2))),
        None if rest.len() > MAX_INLINE_LEN => Err(DecodeError::LineTooLong(MAX_INLINE_LEN)),
        None => Ok(None),
    }
}

/// Length prefix of a bulk string or array; `None` for the `-1` null form.
fn parse_length(line: &[u8]) -> Result<Option<usize>, DecodeError> {
    let invalid = || DecodeError::InvalidLength(String::from_utf8_lossy(line).into_owned());

    match parse_int(line).ok_or_else(invalid)? {
        -1 => Ok(None),
        n if n < 0 => Err(invalid()),
        n => usize::try_from(n).map(Some).map_err(|_| invalid()),
    }
}

fn parse_int(line: &[u8]) -> Option<i64> {
    std::str::from_utf8(line).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn decode_all(input: &[u8]) -> Result<Option<Frame>, DecodeError> {
        let mut decoder = RespDecoder::new();
        decoder.feed(input);
        decoder.try_decode()
    }

    #[test]
    fn test_decode_scalar_frames() {
        assert_eq!(
            decode_all(b"+OK\r\n").unwrap(),
            Some(Frame::Simple("OK".into()))
        );
        assert_eq!(
            decode_all(b"-BUSYGROUP Consumer Group name already exists\r\n").unwrap(),
            Some(Frame::Error(
                "BUSYGROUP Consumer Group name already exists".into()
            ))
        );
        assert_eq!(decode_all(b":1\r\n").unwrap(), Some(Frame::Integer(1)));
        assert_eq!(decode_all(b":-7\r\n").unwrap(), Some(Frame::Integer(-7)));
        assert_eq!(decode_all(b"$-1\r\n").unwrap(), Some(Frame::Null));
        assert_eq!(decode_all(b"*-1\r\n").unwrap(), Some(Frame::Null));
    }

    #[test]
    fn test_decode_bulk_with_embedded_crlf() {
        assert_eq!(
            decode_all(b"$4\r\na\r\nb\r\n").unwrap(),
            Some(bulk("a\r\nb"))
        );
        assert_eq!(decode_all(b"$0\r\n\r\n").unwrap(), Some(bulk("")));
    }

    #[test]
    fn test_decode_subscribe_ack() {
        let frame = decode_all(b"*3\r\n$9\r\nsubscribe\r\n$18\r\nmessages:published\r\n:1\r\n")
            .unwrap()
            .unwrap();

        assert_eq!(
            frame,
            Frame::Array(vec![
                bulk("subscribe"),
                bulk("messages:published"),
                Frame::Integer(1)
            ])
        );
    }

    #[test]
    fn test_decode_nested_array() {
        let frame = decode_all(b"*2\r\n*1\r\n:1\r\n*0\r\n").unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Array(vec![Frame::Integer(1)]),
                Frame::Array(vec![])
            ])
        );
    }

    #[test]
    fn test_incomplete_frame_keeps_bytes() {
        let mut decoder = RespDecoder::new();
        decoder.feed(b"*2\r\n$3\r\nfoo\r\n$3\r\nba");

        assert_eq!(decoder.try_decode().unwrap(), None);
        assert_eq!(decoder.buffered(), 19);

        decoder.feed(b"r\r\n");
        assert_eq!(
            decoder.try_decode().unwrap(),
            Some(Frame::Array(vec![bulk("foo"), bulk("bar")]))
        );
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_multiple_frames_decoded_one_at_a_time() {
        let mut decoder = RespDecoder::new();
        decoder.feed(b":1\r\n:2\r\n:3");

        assert_eq!(decoder.try_decode().unwrap(), Some(Frame::Integer(1)));
        assert_eq!(decoder.try_decode().unwrap(), Some(Frame::Integer(2)));
        assert_eq!(decoder.try_decode().unwrap(), None);

        decoder.feed(b"\r\n");
        assert_eq!(decoder.try_decode().unwrap(), Some(Frame::Integer(3)));
        assert_eq!(decoder.try_decode().unwrap(), None);
    }

    #[test]
    fn test_empty_buffer_is_incomplete() {
        let mut decoder = RespDecoder::new();
        assert_eq!(decoder.try_decode().unwrap(), None);
    }

    #[test]
    fn test_invalid_marker() {
        assert_eq!(
            decode_all(b"!oops\r\n"),
            Err(DecodeError::InvalidMarker(b'!'))
        );
        // Rejected before the line terminator arrives
        assert_eq!(decode_all(b"{"), Err(DecodeError::InvalidMarker(b'{')));
    }

    #[test]
    fn test_invalid_length_prefix() {
        assert_eq!(
            decode_all(b"$abc\r\n"),
            Err(DecodeError::InvalidLength("abc".into()))
        );
        assert_eq!(
            decode_all(b"*-5\r\n"),
            Err(DecodeError::InvalidLength("-5".into()))
        );
        assert_eq!(
            decode_all(b":twelve\r\n"),
            Err(DecodeError::InvalidInteger("twelve".into()))
        );
    }

    #[test]
    fn test_missing_bulk_terminator() {
        assert_eq!(
            decode_all(b"$3\r\nfooXY"),
            Err(DecodeError::MissingTerminator)
        );
    }

    #[test]
    fn test_bulk_limit() {
        let mut decoder = RespDecoder::with_max_bulk_len(4);
        decoder.feed(b"$5\r\n");
        assert_eq!(
            decoder.try_decode(),
            Err(DecodeError::BulkTooLarge { len: 5, limit: 4 })
        );
    }

    #[test]
    fn test_unterminated_line_limit() {
        let mut decoder = RespDecoder::new();
        decoder.feed(b"+");
        decoder.feed(&vec![b'a'; MAX_INLINE_LEN + 1]);
        assert_eq!(
            decoder.try_decode(),
            Err(DecodeError::LineTooLong(MAX_INLINE_LEN))
        );
    }

    #[test]
    fn test_nesting_limit() {
        let input = "*1\r\n".repeat(MAX_NESTING_DEPTH + 1) + ":1\r\n";
        assert_eq!(
            decode_all(input.as_bytes()),
            Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }
}
