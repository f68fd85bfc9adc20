//! The worker run loop
//!
//! ```text
//! Connecting → GroupEnsure → Subscribing → Running → ShuttingDown
//! ```
//!
//! [`start`] walks the first three states against a live broker and hands
//! back a [`Consumer`] whose [`run`](Consumer::run) loop reads, decodes,
//! validates, deduplicates and publishes until a shutdown signal, a closed
//! socket or a fatal read/decode error. Cleanup happens exactly once, on
//! whichever exit path comes first (including `Drop`).

use crate::broker::{BrokerConnection, Subscription};
use crate::config::{ConsumerConfig, ConsumerIdentity};
use crate::error::Result;
use crate::processor::Message;
use crate::publisher::{RedisStreamPublisher, StreamPublisher};
use crate::stats::{StatsCollector, ThroughputReporter};
use dedup_store::{DedupError, DedupStore};
use resp_codec::{DecodeError, Frame};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Connecting,
    GroupEnsure,
    Subscribing,
    Running,
    ShuttingDown,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Connecting => "connecting",
            ConsumerState::GroupEnsure => "group_ensure",
            ConsumerState::Subscribing => "subscribing",
            ConsumerState::Running => "running",
            ConsumerState::ShuttingDown => "shutting_down",
        };
        f.write_str(name)
    }
}

/// Why the run loop stopped
#[derive(Debug)]
pub enum ShutdownReason {
    /// Cancellation was requested through the shutdown channel
    Signal,
    /// The server closed the subscription socket
    PeerClosed,
    ReadFailed(std::io::Error),
    DecodeFailed(DecodeError),
    /// `run` was called on a consumer that had already been cleaned up
    AlreadyStopped,
}

impl ShutdownReason {
    /// Socket or protocol failure, logged at `error`.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ShutdownReason::ReadFailed(_) | ShutdownReason::DecodeFailed(_)
        )
    }

    /// Process exit status once the loop has stopped.
    ///
    /// Every run-loop exit goes through the same cleanup and exits 0, errors
    /// included; only startup failures exit 1.
    pub fn exit_status(&self) -> u8 {
        0
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal => f.write_str("shutdown requested"),
            ShutdownReason::PeerClosed => f.write_str("connection closed by server"),
            ShutdownReason::ReadFailed(e) => write!(f, "error reading from socket: {}", e),
            ShutdownReason::DecodeFailed(e) => write!(f, "error reading reply: {}", e),
            ShutdownReason::AlreadyStopped => f.write_str("consumer already stopped"),
        }
    }
}

/// What happened to a single channel message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published,
    Duplicate,
    /// Invalid JSON, missing identifier, or re-encoding failure
    Rejected,
    /// The append failed; the identifier is recorded as seen regardless
    PublishFailed,
    /// Not a channel message (e.g. a further subscribe confirmation)
    Ignored,
}

/// One worker: a subscription, a publisher, and the local dedup state.
pub struct Consumer<S, P> {
    identity: ConsumerIdentity,
    stream_key: String,
    subscription: Option<Subscription<S>>,
    publisher: Option<P>,
    dedup: DedupStore,
    stats: StatsCollector,
    reporter: ThroughputReporter,
    loop_pause: Duration,
    state: ConsumerState,
    released: bool,
}

/// Connect, ensure the consumer group, and subscribe.
///
/// Any failure here is fatal; the partially opened connections are dropped
/// before returning.
pub async fn start(
    config: &ConsumerConfig,
    stats: StatsCollector,
) -> Result<Consumer<TcpStream, RedisStreamPublisher>> {
    log_transition(ConsumerState::Connecting);
    let mut broker =
        BrokerConnection::connect(&config.host, config.port, config.command_timeout).await?;

    log_transition(ConsumerState::GroupEnsure);
    broker
        .ensure_group_and_stream(&config.stream_key, &config.group_name)
        .await?;

    log_transition(ConsumerState::Subscribing);
    let (publisher, subscription) = broker
        .subscribe(&config.channel, config.read_buffer_size)
        .await?;

    Ok(Consumer::new(config, subscription, publisher, stats))
}

fn log_transition(state: ConsumerState) {
    info!(state = %state, "Consumer state changed");
}

impl<S, P> Consumer<S, P> {
    /// Wrap an established subscription and publisher.
    pub fn new(
        config: &ConsumerConfig,
        subscription: Subscription<S>,
        publisher: P,
        stats: StatsCollector,
    ) -> Self {
        Self {
            identity: config.identity,
            stream_key: config.stream_key.clone(),
            subscription: Some(subscription),
            publisher: Some(publisher),
            dedup: DedupStore::with_capacity(config.dedup_capacity),
            stats,
            reporter: ThroughputReporter::new(config.report_interval),
            loop_pause: config.loop_pause,
            state: ConsumerState::Subscribing,
            released: false,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn identity(&self) -> ConsumerIdentity {
        self.identity
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Close both connections and release the dedup store.
    ///
    /// Returns `false` if cleanup had already run.
    pub fn shutdown(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        self.state = ConsumerState::ShuttingDown;
        log_transition(self.state);

        info!("Cleaning up redis connection");
        self.subscription.take();
        self.publisher.take();

        info!("Cleaning up consumer state");
        let tracked = self.dedup.release();

        let snapshot = self.stats.snapshot();
        info!(
            tracked_ids = tracked,
            stats = %serde_json::to_string(&snapshot).unwrap_or_default(),
            "Consumer stopped"
        );
        true
    }

    fn set_state(&mut self, state: ConsumerState) {
        if self.state != state {
            self.state = state;
            log_transition(state);
        }
    }
}

impl<S, P> Consumer<S, P>
where
    S: AsyncRead + Unpin,
    P: StreamPublisher,
{
    /// Run until shutdown is requested or the subscription fails.
    ///
    /// Cleanup has always run by the time this returns.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> ShutdownReason {
        if self.released {
            return ShutdownReason::AlreadyStopped;
        }

        self.set_state(ConsumerState::Running);
        let reason = self.run_loop(shutdown).await;

        if reason.is_error() {
            error!(reason = %reason, "Stopping consumer");
        } else {
            info!(reason = %reason, "Stopping consumer");
        }

        self.shutdown();
        reason
    }

    async fn run_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> ShutdownReason {
        loop {
            // Frames may already be buffered, e.g. bytes that followed the
            // subscribe acknowledgement in the same read.
            loop {
                if *shutdown.borrow() {
                    return ShutdownReason::Signal;
                }

                let next = match self.subscription.as_mut() {
                    Some(subscription) => subscription.next_frame(),
                    None => return ShutdownReason::AlreadyStopped,
                };

                match next {
                    Ok(Some(frame)) => {
                        self.handle_frame(frame).await;
                    }
                    Ok(None) => break,
                    Err(e) => return ShutdownReason::DecodeFailed(e),
                }
            }

            let Some(subscription) = self.subscription.as_mut() else {
                return ShutdownReason::AlreadyStopped;
            };

            let read = tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped.
                        return ShutdownReason::Signal;
                    }
                    continue;
                }
                read = subscription.read() => read,
            };

            match read {
                Ok(0) => return ShutdownReason::PeerClosed,
                Ok(_) => {}
                Err(e) => return ShutdownReason::ReadFailed(e),
            }

            tokio::time::sleep(self.loop_pause).await;
        }
    }

    /// Dispatch one decoded frame; only channel messages are processed.
    pub async fn handle_frame(&mut self, frame: Frame) -> Outcome {
        self.stats.record_frame();

        match frame.into_channel_message() {
            Some(message) => self.handle_payload(&message.payload).await,
            None => {
                debug!("Ignoring non-message frame");
                Outcome::Ignored
            }
        }
    }

    /// Validate, deduplicate, annotate and publish one payload.
    pub async fn handle_payload(&mut self, payload: &[u8]) -> Outcome {
        debug!(payload = %String::from_utf8_lossy(payload), "Received message");

        let message = match Message::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping invalid message");
                self.stats.record_rejected();
                return Outcome::Rejected;
            }
        };
        debug!(message_id = %message.id, "Parsed message_id");

        if self.dedup.seen(&message.id) {
            info!(message_id = %message.id, "Message has already been processed");
            self.stats.record_duplicate();
            return Outcome::Duplicate;
        }

        let consumer_id = self.identity.consumer_id();
        let annotated = match message.annotate(consumer_id) {
            Ok(annotated) => annotated,
            Err(e) => {
                warn!(error = %e, "Dropping message");
                self.stats.record_rejected();
                return Outcome::Rejected;
            }
        };
        debug!(message = %annotated, "Processed message");

        let Some(publisher) = self.publisher.as_mut() else {
            return Outcome::PublishFailed;
        };

        let outcome = match publisher
            .publish(&self.stream_key, &message.id, consumer_id)
            .await
        {
            Ok(entry_id) => {
                debug!(entry_id = %entry_id, message_id = %message.id, "Stored processed message");
                self.stats.record_publish();
                Outcome::Published
            }
            Err(e) => {
                error!(error = %e, message_id = %message.id, "Failed to publish message");
                self.stats.record_publish_error();
                Outcome::PublishFailed
            }
        };

        // Recorded even when the append failed.
        if let Err(DedupError::CapacityExceeded { .. }) = self.dedup.record(message.id) {
            self.stats.record_untracked();
        }

        self.reporter.record(Instant::now());
        outcome
    }
}

impl<S, P> Drop for Consumer<S, P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
