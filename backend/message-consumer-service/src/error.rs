//! Error types for the message consumer
//!
//! Everything here is fatal: startup failures terminate the process, run-loop
//! failures end the loop and go through the shutdown path. Per-message
//! failures live next to the code that raises them
//! ([`ProcessError`](crate::processor::ProcessError),
//! [`PublishError`](crate::publisher::PublishError)) and never unwind.

use thiserror::Error;

/// Result type for consumer operations
pub type Result<T> = std::result::Result<T, ConsumerError>;

#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Could not reach the broker
    #[error("Error connecting to redis server at {addr}: {reason}")]
    Connection { addr: String, reason: String },

    /// XGROUP CREATE was rejected
    #[error("Error creating consumer group: {0}")]
    GroupSetup(#[source] redis::RedisError),

    /// SUBSCRIBE failed or was acknowledged with an unexpected reply
    #[error("Error subscribing to channel: {0}")]
    Subscription(String),

    /// Malformed bytes on the subscription socket
    #[error("Error reading reply: {0}")]
    Decode(#[from] resp_codec::DecodeError),

    /// Socket read/write failure
    #[error("Error reading from socket: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by server")]
    ConnectionClosed,
}
