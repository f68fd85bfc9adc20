//! Message consumer binary
//!
//! ```text
//! message-consumer -c <consumer-id> -g <group-size> [-h host] [-p port] [-v]
//! ```
//!
//! Exits 0 after `--help` or once the run loop stops (signal, server closed
//! the connection, read or decode error) and 1 on invalid arguments or a
//! connection/setup failure.

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use message_consumer_service::config::{Cli, ConsumerConfig};
use message_consumer_service::{consumer, StatsCollector};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let config = match ConsumerConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.verbose);

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

async fn run(config: ConsumerConfig) -> anyhow::Result<ExitCode> {
    info!(
        consumer_id = config.identity.consumer_id(),
        group_size = config.identity.group_size(),
        redis = %config.redis_url(),
        channel = %config.channel,
        stream = %config.stream_key,
        "Starting message consumer"
    );

    // Setup shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let stats = StatsCollector::new();
    let mut consumer = tokio::select! {
        started = consumer::start(&config, stats) => {
            started.context("Failed to start consumer")?
        }
        _ = wait_for_shutdown(&mut shutdown_rx) => {
            info!("Shutdown requested during startup");
            return Ok(ExitCode::SUCCESS);
        }
    };

    let reason = consumer.run(&mut shutdown_rx).await;
    Ok(ExitCode::from(reason.exit_status()))
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}
