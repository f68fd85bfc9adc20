//! Broker connection and channel subscription
//!
//! A worker holds two connections to the same Redis server:
//!
//! ```text
//! BrokerConnection::connect(host, port)
//!   ├── command connection (redis crate)   XGROUP CREATE, XADD
//!   └── subscription socket (raw TCP)      SUBSCRIBE, then pushed messages
//! ```
//!
//! A RESP2 connection in subscribe mode refuses every other command, so the
//! stream appends cannot share the subscription socket. Replies on the raw
//! socket are decoded by [`resp_codec::RespDecoder`].

use crate::error::{ConsumerError, Result};
use crate::publisher::{GroupStatus, RedisStreamPublisher, StreamPublisher};
use resp_codec::{DecodeError, Frame, RespDecoder};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// Live connection to the broker, prior to subscribing.
pub struct BrokerConnection {
    publisher: RedisStreamPublisher,
    socket: TcpStream,
}

impl BrokerConnection {
    /// Open both the command connection and the subscription socket.
    pub async fn connect(host: &str, port: u16, command_timeout: Duration) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let connection_error = |reason: String| ConsumerError::Connection {
            addr: addr.clone(),
            reason,
        };

        let socket = match timeout(command_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => return Err(connection_error(e.to_string())),
            Err(_) => return Err(connection_error("connect timed out".to_string())),
        };
        socket
            .set_nodelay(true)
            .map_err(|e| connection_error(e.to_string()))?;

        let redis_url = format!("redis://{}/", addr);
        let publisher = RedisStreamPublisher::connect(&redis_url, command_timeout)
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        info!(addr = %addr, "Connected to redis");

        Ok(Self { publisher, socket })
    }

    pub async fn ensure_group_and_stream(
        &mut self,
        stream_key: &str,
        group_name: &str,
    ) -> Result<GroupStatus> {
        ensure_group_and_stream(&mut self.publisher, stream_key, group_name).await
    }

    /// Subscribe to `channel`, handing back the command side for publishing.
    pub async fn subscribe(
        self,
        channel: &str,
        read_buffer_size: usize,
    ) -> Result<(RedisStreamPublisher, Subscription<TcpStream>)> {
        let subscription = Subscription::establish(self.socket, channel, read_buffer_size).await?;
        Ok((self.publisher, subscription))
    }
}

/// Create the consumer group (and stream). Any failure other than
/// "group already exists" is fatal.
pub async fn ensure_group_and_stream<P>(
    publisher: &mut P,
    stream_key: &str,
    group_name: &str,
) -> Result<GroupStatus>
where
    P: StreamPublisher + ?Sized,
{
    let status = publisher
        .ensure_group(stream_key, group_name)
        .await
        .map_err(ConsumerError::GroupSetup)?;

    match status {
        GroupStatus::Created => {
            info!(stream = %stream_key, group = %group_name, "Created consumer group")
        }
        GroupStatus::AlreadyExists => {
            info!(stream = %stream_key, group = %group_name, "Consumer group already exists")
        }
    }

    Ok(status)
}

/// A subscribed socket plus the decoder holding any partially read reply.
pub struct Subscription<S> {
    stream: S,
    decoder: RespDecoder,
    buf: Vec<u8>,
    channel: String,
}

impl<S> Subscription<S> {
    /// Channel confirmed by the server
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Bytes read but not yet decoded into a frame
    pub fn buffered(&self) -> usize {
        self.decoder.buffered()
    }
}

impl<S> Subscription<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Issue `SUBSCRIBE <channel>` and wait for the acknowledgement.
    ///
    /// Bytes that arrive after the acknowledgement in the same read stay
    /// buffered for the run loop.
    pub async fn establish(mut stream: S, channel: &str, read_buffer_size: usize) -> Result<Self> {
        let command = redis::cmd("SUBSCRIBE").arg(channel).get_packed_command();
        stream
            .write_all(&command)
            .await
            .map_err(|e| ConsumerError::Subscription(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| ConsumerError::Subscription(e.to_string()))?;

        let mut subscription = Self {
            stream,
            decoder: RespDecoder::new(),
            buf: vec![0; read_buffer_size],
            channel: channel.to_string(),
        };

        let ack = subscription
            .next_reply()
            .await
            .map_err(|e| ConsumerError::Subscription(e.to_string()))?;
        verify_subscribe_ack(&ack, channel)?;

        info!(channel = %channel, "Successfully subscribed to channel");
        Ok(subscription)
    }
}

impl<S> Subscription<S>
where
    S: AsyncRead + Unpin,
{
    /// Blocking read of whatever bytes are available into the fixed buffer.
    ///
    /// Returns the byte count; 0 means the server closed the connection.
    /// The bytes are fed to the decoder before returning.
    pub async fn read(&mut self) -> std::io::Result<usize> {
        let n = self.stream.read(&mut self.buf).await?;
        self.decoder.feed(&self.buf[..n]);
        debug!(bytes = n, buffered = self.decoder.buffered(), "Read from socket");
        Ok(n)
    }

    /// Next complete frame already buffered, if any.
    pub fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        self.decoder.try_decode()
    }

    async fn next_reply(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.next_frame()? {
                return Ok(frame);
            }
            if self.read().await? == 0 {
                return Err(ConsumerError::ConnectionClosed);
            }
        }
    }
}

/// Accept a 3+ element array whose second element names `channel`.
fn verify_subscribe_ack(frame: &Frame, channel: &str) -> Result<()> {
    if let Frame::Error(message) = frame {
        return Err(ConsumerError::Subscription(message.clone()));
    }

    match frame.elements() {
        Some(items) if items.len() >= 3 && items[1].as_str() == Some(channel) => Ok(()),
        _ => Err(ConsumerError::Subscription(format!(
            "unexpected acknowledgement {:?}",
            frame
        ))),
    }
}
