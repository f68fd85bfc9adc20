//! Incremental RESP reply decoder
//!
//! Turns the raw byte stream of a Redis connection into discrete reply
//! frames, tolerating arbitrary chunk boundaries.
//!
//! # Architecture
//!
//! ```text
//! socket.read(&mut buf) ──► decoder.feed(&buf[..n])
//!                                  │
//!                                  ▼
//!                          decoder.try_decode()
//!                          ├── Ok(Some(Frame))   one complete reply, bytes consumed
//!                          ├── Ok(None)          incomplete, bytes kept for next feed
//!                          └── Err(DecodeError)  malformed marker / length prefix
//! ```
//!
//! The decoder never touches the network, so it can be driven from tests with
//! synthetic fragmented input.
//!
//! # Example
//!
//! ```
//! use resp_codec::{Frame, RespDecoder};
//!
//! let mut decoder = RespDecoder::new();
//! decoder.feed(b"*3\r\n$7\r\nmessage\r\n$4\r\nchan");
//! assert_eq!(decoder.try_decode().unwrap(), None);
//!
//! decoder.feed(b"\r\n$2\r\nhi\r\n");
//! let frame = decoder.try_decode().unwrap().unwrap();
//! let message = frame.into_channel_message().unwrap();
//! assert_eq!(&message.channel[..], b"chan");
//! assert_eq!(&message.payload[..], b"hi");
//! ```

mod decoder;
mod error;
mod frame;

pub use decoder::{RespDecoder, DEFAULT_MAX_BULK_LEN, MAX_INLINE_LEN};
pub use error::DecodeError;
pub use frame::{ChannelMessage, Frame};
