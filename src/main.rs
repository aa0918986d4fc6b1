//! postline: deliver one POST body to one destination, with retries.
//!
//! Loads configuration, sends the body once, and waits until the send is
//! delivered, exhausts its attempts, or is dropped. Ctrl-C or SIGTERM stops
//! the wait early.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use postline_delivery::{AttemptOutcome, DeliveryCoordinator};
use tracing::{error, info, warn};

mod config;

use config::{Config, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "postline", about = "Deliver an HTTP POST with bounded retries", version)]
struct Cli {
    /// Request body to POST.
    body: String,

    /// Destination URL, overriding configuration.
    #[arg(long, short = 'u')]
    url: Option<String>,

    /// Configuration file.
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(url) = cli.url {
        config.url = url;
    }

    init_tracing(&config.rust_log)?;

    info!(
        url = %config.url,
        max_workers = config.max_workers,
        queue_capacity = config.queue_capacity,
        max_attempts = config.max_attempts,
        "configuration loaded"
    );

    let coordinator = DeliveryCoordinator::with_config(&config.url, config.to_delivery_config())
        .context("failed to create delivery coordinator")?;

    let handle = coordinator.send(cli.body);
    let status = handle.status();

    match handle.await {
        Ok(response) => info!(
            send_id = %status.id(),
            status = response.status_code,
            duration_ms = response.duration.as_millis(),
            "first attempt answered"
        ),
        Err(e) => warn!(send_id = %status.id(), error = %e, "first attempt failed"),
    }

    let outcome = tokio::select! {
        outcome = status.wait_finished() => outcome,
        () = shutdown_signal() => {
            let stats = coordinator.stats();
            warn!(
                queued_retries = stats.queued_retries,
                active_workers = stats.active_workers,
                "shutting down with retries outstanding"
            );
            anyhow::bail!("interrupted before delivery finished");
        },
    };

    let stats = coordinator.stats();
    info!(
        %outcome,
        attempts = stats.attempts_issued,
        peak_workers = stats.peak_workers,
        "send finished"
    );

    if outcome != AttemptOutcome::Delivered {
        error!(%outcome, url = %config.url, "POST was not delivered");
        anyhow::bail!("POST to {} was not delivered: {outcome}", config.url);
    }

    Ok(())
}

/// Initializes tracing, preferring `RUST_LOG` over configured directives.
fn init_tracing(directives: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .context("invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C signal");
        },
        () = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
