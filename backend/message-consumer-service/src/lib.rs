//! Message consumer worker
//!
//! Subscribes to a Redis pub/sub channel, validates and deduplicates each
//! JSON message, annotates it with the consumer id and appends it to a Redis
//! stream. Several workers may run side by side; each receives every message
//! and deduplicates only what it has seen itself.
//!
//! # Modules
//!
//! - [`config`]: command-line flags and fixed deployment defaults
//! - [`broker`]: broker connections and the channel subscription
//! - [`processor`]: JSON validation and annotation
//! - [`publisher`]: stream appends (`XADD`) and group creation
//! - [`stats`]: lifetime counters and the periodic throughput report
//! - [`consumer`]: the run loop and its single-shot cleanup

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod processor;
pub mod publisher;
pub mod stats;

pub use config::{ConsumerConfig, ConsumerIdentity};
pub use consumer::{Consumer, ConsumerState, Outcome, ShutdownReason};
pub use error::{ConsumerError, Result};
pub use publisher::{GroupStatus, PublishError, RedisStreamPublisher, StreamPublisher};
pub use stats::{ConsumerStats, StatsCollector};
