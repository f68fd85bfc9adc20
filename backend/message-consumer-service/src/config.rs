//! Command-line configuration for the message consumer
//!
//! Only the consumer identity and the Redis address are configurable; channel,
//! stream and group names are fixed for every worker in the deployment.

use clap::{ArgAction, Parser};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Pub/sub channel producers publish raw messages to
pub const PUBLISH_CHANNEL: &str = "messages:published";
/// Stream of record for processed messages
pub const STREAM_KEY: &str = "messages:processed";
pub const CONSUMER_GROUP: &str = "test_group";

/// Size of the buffer each socket read fills
pub const READ_BUFFER_SIZE: usize = 1024;
pub const REPORT_INTERVAL: Duration = Duration::from_secs(3);
/// Pause between loop iterations to yield the CPU
pub const LOOP_PAUSE: Duration = Duration::from_millis(1);
pub const REDIS_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Raw command-line flags.
///
/// `-h` is taken by `--host`, so the built-in help flag is replaced by `-?`.
#[derive(Debug, Parser)]
#[command(
    name = "message-consumer",
    about = "Consumes messages from redis with specified number of consumers, \
             where multiple consumers can independently process messages from the same stream.",
    long_about = "Consumes messages from redis with specified number of consumers, \
                  where multiple consumers can independently process messages from the same stream.\n\
                  Reports periodically number of processed messages.",
    disable_help_flag = true
)]
pub struct Cli {
    /// Consumer ID (integer)
    #[arg(short = 'c', long = "consumer-id", value_parser = clap::value_parser!(u32).range(1..))]
    pub consumer_id: u32,

    /// Consumer group size (integer)
    #[arg(short = 'g', long = "group-size", value_parser = clap::value_parser!(u32).range(1..))]
    pub group_size: u32,

    /// Redis host
    #[arg(short = 'h', long, default_value = DEFAULT_REDIS_HOST)]
    pub host: String,

    /// Redis port
    #[arg(short = 'p', long, default_value_t = DEFAULT_REDIS_PORT)]
    pub port: u16,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Show this help message
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid consumer id")]
    InvalidConsumerId,

    #[error("Invalid consumer group size")]
    InvalidGroupSize,

    #[error("Too many consumers. Maximum number of consumers is {group_size}")]
    TooManyConsumers { consumer_id: u32, group_size: u32 },
}

/// Who this worker is within its group.
///
/// Validation metadata only: every consumer receives the full message stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerIdentity {
    consumer_id: u32,
    group_size: u32,
}

impl ConsumerIdentity {
    pub fn new(consumer_id: u32, group_size: u32) -> Result<Self, ConfigError> {
        if group_size == 0 {
            return Err(ConfigError::InvalidGroupSize);
        }
        if consumer_id == 0 {
            return Err(ConfigError::InvalidConsumerId);
        }
        if consumer_id > group_size {
            return Err(ConfigError::TooManyConsumers {
                consumer_id,
                group_size,
            });
        }

        Ok(Self {
            consumer_id,
            group_size,
        })
    }

    pub fn consumer_id(&self) -> u32 {
        self.consumer_id
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }
}

/// Validated worker configuration
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub identity: ConsumerIdentity,
    pub host: String,
    pub port: u16,
    pub verbose: bool,
    pub channel: String,
    pub stream_key: String,
    pub group_name: String,
    pub read_buffer_size: usize,
    pub dedup_capacity: usize,
    pub report_interval: Duration,
    pub loop_pause: Duration,
    pub command_timeout: Duration,
}

impl ConsumerConfig {
    /// Configuration with the fixed deployment defaults.
    pub fn new(identity: ConsumerIdentity, host: impl Into<String>, port: u16) -> Self {
        Self {
            identity,
            host: host.into(),
            port,
            verbose: false,
            channel: PUBLISH_CHANNEL.to_string(),
            stream_key: STREAM_KEY.to_string(),
            group_name: CONSUMER_GROUP.to_string(),
            read_buffer_size: READ_BUFFER_SIZE,
            dedup_capacity: dedup_store::DEFAULT_CAPACITY,
            report_interval: REPORT_INTERVAL,
            loop_pause: LOOP_PAUSE,
            command_timeout: REDIS_COMMAND_TIMEOUT,
        }
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let identity = ConsumerIdentity::new(cli.consumer_id, cli.group_size)?;

        Ok(Self {
            verbose: cli.verbose,
            ..Self::new(identity, cli.host, cli.port)
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("message-consumer").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["-c", "1", "-g", "1"]).unwrap();
        let config = ConsumerConfig::from_cli(cli).unwrap();

        assert_eq!(config.identity.consumer_id(), 1);
        assert_eq!(config.identity.group_size(), 1);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert!(!config.verbose);
        assert_eq!(config.channel, "messages:published");
        assert_eq!(config.stream_key, "messages:processed");
        assert_eq!(config.group_name, "test_group");
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.dedup_capacity, 10_000);
        assert_eq!(config.report_interval, Duration::from_secs(3));
        assert_eq!(config.redis_url(), "redis://localhost:6379/");
    }

    #[test]
    fn test_long_flags() {
        let cli = parse(&[
            "--consumer-id",
            "2",
            "--group-size",
            "3",
            "--host",
            "redis.internal",
            "--port",
            "6380",
            "--verbose",
        ])
        .unwrap();
        let config = ConsumerConfig::from_cli(cli).unwrap();

        assert_eq!(config.identity.consumer_id(), 2);
        assert_eq!(config.identity.group_size(), 3);
        assert_eq!(config.host, "redis.internal");
        assert_eq!(config.port, 6380);
        assert!(config.verbose);
    }

    #[test]
    fn test_short_h_is_host() {
        let cli = parse(&["-c", "1", "-g", "2", "-h", "10.0.0.5", "-p", "7000"]).unwrap();
        assert_eq!(cli.host, "10.0.0.5");
        assert_eq!(cli.port, 7000);
    }

    #[test]
    fn test_help_flag() {
        let err = parse(&["-?"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_mandatory_flags() {
        let err = parse(&["-c", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = parse(&["-g", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_non_positive_values_rejected() {
        assert!(parse(&["-c", "0", "-g", "1"]).is_err());
        assert!(parse(&["-c", "1", "-g", "0"]).is_err());
        assert!(parse(&["-c", "-1", "-g", "1"]).is_err());
        assert!(parse(&["-c", "abc", "-g", "1"]).is_err());
    }

    #[test]
    fn test_consumer_id_above_group_size() {
        let cli = parse(&["-c", "3", "-g", "2"]).unwrap();
        let err = ConsumerConfig::from_cli(cli).unwrap_err();

        assert_eq!(
            err,
            ConfigError::TooManyConsumers {
                consumer_id: 3,
                group_size: 2
            }
        );
        assert_eq!(
            err.to_string(),
            "Too many consumers. Maximum number of consumers is 2"
        );
    }

    #[test]
    fn test_identity_validation() {
        assert!(ConsumerIdentity::new(1, 1).is_ok());
        assert!(ConsumerIdentity::new(5, 5).is_ok());
        assert_eq!(
            ConsumerIdentity::new(0, 1),
            Err(ConfigError::InvalidConsumerId)
        );
        assert_eq!(
            ConsumerIdentity::new(1, 0),
            Err(ConfigError::InvalidGroupSize)
        );
    }
}
