//! Stream of record
//!
//! Processed messages are appended to a Redis stream with
//! `XADD <stream> * message_id <id> consumer_id <n>`; the server assigns the
//! entry id. Only those two attributes are stored.

use async_trait::async_trait;
use dedup_store::MessageId;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Outcome of `XGROUP CREATE ... MKSTREAM`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Created,
    /// The server answered BUSYGROUP; the group and stream are already there
    AlreadyExists,
}

/// Per-message append failure; the message is still marked as seen.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Error storing processed message in Redis: {0}")]
    Redis(#[from] RedisError),
}

/// Append-only sink for processed messages.
#[async_trait]
pub trait StreamPublisher: Send {
    /// Create the consumer group, creating the stream if it does not exist.
    async fn ensure_group(
        &mut self,
        stream_key: &str,
        group_name: &str,
    ) -> Result<GroupStatus, RedisError>;

    /// Append one entry and return the server-assigned entry id.
    async fn publish(
        &mut self,
        stream_key: &str,
        message_id: &MessageId,
        consumer_id: u32,
    ) -> Result<String, PublishError>;
}

/// [`StreamPublisher`] backed by a multiplexed Redis connection
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    command_timeout: Duration,
}

impl RedisStreamPublisher {
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> Result<Self, RedisError> {
        let client = Client::open(redis_url)?;
        let conn = run_with_timeout(command_timeout, client.get_multiplexed_async_connection())
            .await?;

        Ok(Self {
            conn,
            command_timeout,
        })
    }
}

#[async_trait]
impl StreamPublisher for RedisStreamPublisher {
    async fn ensure_group(
        &mut self,
        stream_key: &str,
        group_name: &str,
    ) -> Result<GroupStatus, RedisError> {
        let result = run_with_timeout(
            self.command_timeout,
            redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream_key)
                .arg(group_name)
                .arg("0")
                .arg("MKSTREAM")
                .query_async::<_, ()>(&mut self.conn),
        )
        .await;

        match result {
            Ok(()) => Ok(GroupStatus::Created),
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(GroupStatus::AlreadyExists),
            Err(err) => Err(err),
        }
    }

    async fn publish(
        &mut self,
        stream_key: &str,
        message_id: &MessageId,
        consumer_id: u32,
    ) -> Result<String, PublishError> {
        let entry_id = run_with_timeout(
            self.command_timeout,
            redis::cmd("XADD")
                .arg(stream_key)
                .arg("*")
                .arg("message_id")
                .arg(message_id.as_str())
                .arg("consumer_id")
                .arg(consumer_id)
                .query_async::<_, String>(&mut self.conn),
        )
        .await?;

        Ok(entry_id)
    }
}

/// Bound a Redis call; an expired timer surfaces as an I/O-kind `RedisError`.
pub async fn run_with_timeout<F, T>(limit: Duration, future: F) -> Result<T, RedisError>
where
    F: std::future::Future<Output = Result<T, RedisError>>,
{
    match timeout(limit, future).await {
        Ok(res) => res,
        Err(_) => Err(RedisError::from((
            redis::ErrorKind::IoError,
            "redis command timed out",
        ))),
    }
}
