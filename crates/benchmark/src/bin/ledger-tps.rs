//! Ledger TPS load generator.
//!
//! # Usage
//!
//! ```bash
//! # Fan out from a funded key against a local node until Ctrl+C
//! ledger-tps --main-key 0x... --jsonrpc-endpoint http://127.0.0.1:8545
//!
//! # Load options from a file, run for ten minutes, log to a file
//! ledger-tps --config bench.toml --duration-secs 600 --logfile logs/ledger-tps.log
//!
//! # Single-destination flood instead of fan-out
//! ledger-tps --main-key 0x... --load-pattern fixed-destination
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use ledger_tps_benchmark::{Benchmark, BenchmarkConfig, ConfigOverrides};
use std::fs;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Ledger TPS Benchmark
///
/// Recursively splits a funded account's balance into fresh accounts to
/// drive sustained transfer throughput against a ledger endpoint.
#[derive(Parser)]
#[command(name = "ledger-tps")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to log file (redirects all logs to this file)
    #[arg(long)]
    logfile: Option<PathBuf>,
}

fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let Some(log_file) = &cli.logfile else {
        builder.init();
        return Ok(None);
    };

    let directory = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log directory: {}", directory.display()))?;
    let file_name = log_file
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid log file name: {}", log_file.display()))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    builder
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .init();
    Ok(Some(guard))
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
        }

        info!("Stopping new sends, draining in-flight transfers...");
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BenchmarkConfig::load(path).context("Failed to load configuration")?,
        None => BenchmarkConfig::default(),
    };
    config.apply_overrides(&cli.overrides);

    let _log_guard = init_logging(&cli)?;

    config.validate().context("Invalid configuration")?;
    info!(
        endpoint = %config.jsonrpc_endpoint,
        pattern = %config.load_pattern,
        balance_limit = config.balance_limit,
        pending_tx_limit = config.pending_tx_limit,
        "Ledger TPS benchmark starting"
    );

    let benchmark = Benchmark::connect(config)
        .await
        .context("Failed to connect to ledger")?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let report = match benchmark.config().duration() {
        Some(duration) => {
            info!(?duration, "Running for fixed duration, press Ctrl+C to stop early");
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                timer.cancel();
            });
            benchmark.run_until_cancelled(cancel).await?
        }
        None => {
            info!("Running until interrupted, press Ctrl+C to stop");
            benchmark.run_until_cancelled(cancel).await?
        }
    };

    report.print();
    Ok(())
}
