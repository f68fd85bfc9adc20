//! Decoded reply frames

use bytes::Bytes;

/// One decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`
    Bulk(Bytes),
    /// `$-1\r\n` or `*-1\r\n`
    Null,
    /// `*2\r\n...`
    Array(Vec<Frame>),
}

/// A message pushed on a subscribed channel: `["message", channel, payload]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: Bytes,
    pub payload: Bytes,
}

impl Frame {
    /// Raw bytes of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Bulk(data) => Some(data),
            Frame::Simple(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// String view of a bulk or simple string, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Elements of an array frame.
    pub fn elements(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Extract a pub/sub channel message.
    ///
    /// Returns `None` for anything other than a three element array whose
    /// kind is `message` (subscribe confirmations, pongs, errors).
    pub fn into_channel_message(self) -> Option<ChannelMessage> {
        let Frame::Array(items) = self else {
            return None;
        };
        if items.len() != 3 {
            return None;
        }

        let mut items = items.into_iter();
        let kind = items.next()?;
        if !kind
            .as_bytes()
            .is_some_and(|k| k.eq_ignore_ascii_case(b"message"))
        {
            return None;
        }

        let channel = match items.next()? {
            Frame::Bulk(data) => data,
            Frame::Simple(s) => Bytes::from(s),
            _ => return None,
        };
        let payload = match items.next()? {
            Frame::Bulk(data) => data,
            Frame::Simple(s) => Bytes::from(s),
            _ => return None,
        };

        Some(ChannelMessage { channel, payload })
    }
}
