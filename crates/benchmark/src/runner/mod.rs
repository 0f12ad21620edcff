//! Benchmark orchestration.

use crate::accounts::KeySupply;
use crate::config::{BenchmarkConfig, ConfigError, LoadPatternKind};
use crate::distribution::{DistributionEngine, DistributionSettings};
use crate::pattern::{FixedDestinationLoop, LoadPattern, PatternReport};
use crate::retry::{RetryPolicy, Retrying};
use crate::stats::{StatsAggregator, StatsSnapshot};
use ledger_tps_ledger::{KeyError, LedgerClient, LedgerError};
use ledger_tps_ledger_rpc::RpcLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors that stop a benchmark from starting.
#[derive(Debug, thiserror::Error)]
pub enum BenchmarkError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("key supply error: {0}")]
    Keys(#[from] KeyError),

    #[error("ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
}

/// Load generator bound to one ledger.
pub struct Benchmark<L> {
    config: BenchmarkConfig,
    ledger: Arc<Retrying<L>>,
    network_id: u64,
    keys: Option<KeySupply>,
}

impl Benchmark<RpcLedger> {
    /// Dial the configured JSON-RPC endpoint and verify it answers.
    pub async fn connect(config: BenchmarkConfig) -> Result<Self, BenchmarkError> {
        let ledger = RpcLedger::dial(config.rpc_config()).await?;
        info!(
            endpoint = %ledger.endpoint(),
            chain_id = ledger.chain_id(),
            "Dialed ledger"
        );
        Self::with_ledger(config, ledger).await
    }
}

impl<L: LedgerClient> Benchmark<L> {
    /// Use an already constructed ledger client. Every call to it is
    /// retried on transient failures.
    pub async fn with_ledger(config: BenchmarkConfig, ledger: L) -> Result<Self, BenchmarkError> {
        config.validate()?;
        let ledger = Arc::new(Retrying::new(ledger, RetryPolicy::default()));
        let network_id = ledger.network_id().await?;
        info!(network_id, "Ledger network verified");

        Ok(Self {
            config,
            ledger,
            network_id,
            keys: None,
        })
    }

    /// Draw fresh accounts from `keys` instead of a background generator.
    pub fn with_key_supply(mut self, keys: KeySupply) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Run for `duration`, then cancel and drain.
    pub async fn run_for(&self, duration: Duration) -> Result<BenchmarkReport, BenchmarkError> {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            cancel_clone.cancel();
        });

        self.run_until_cancelled(cancel).await
    }

    /// Run the configured load pattern until it finishes or `cancel` fires.
    pub async fn run_until_cancelled(
        &self,
        cancel: CancellationToken,
    ) -> Result<BenchmarkReport, BenchmarkError> {
        let start = Instant::now();
        let root = self.config.root_account()?;
        let keys = match &self.keys {
            Some(keys) => keys.clone(),
            None => KeySupply::spawn(self.config.key_buffer)?,
        };
        let stats = Arc::new(StatsAggregator::new(self.config.stats_window()));

        match self.ledger.balance_of(root.address()).await {
            Ok(balance) => info!(root = %root.address(), %balance, "Root account loaded"),
            Err(e) => warn!(root = %root.address(), error = %e, "Root balance unavailable"),
        }

        let pattern = self.build_pattern(keys, Arc::clone(&stats));
        info!(pattern = pattern.name(), "Starting load pattern");

        let done = CancellationToken::new();
        let reporter = spawn_progress_reporter(
            Arc::clone(&stats),
            self.config.report_interval(),
            done.clone(),
        );

        let outcome = pattern.run(root, cancel).await;

        done.cancel();
        let _ = reporter.await;

        Ok(BenchmarkReport {
            duration: start.elapsed(),
            pattern: pattern.name(),
            stats: stats.snapshot(),
            outcome,
        })
    }

    fn build_pattern(&self, keys: KeySupply, stats: Arc<StatsAggregator>) -> Box<dyn LoadPattern> {
        let ledger = Arc::clone(&self.ledger);
        match self.config.load_pattern {
            LoadPatternKind::FanOut => Box::new(DistributionEngine::new(
                ledger,
                keys,
                stats,
                DistributionSettings {
                    balance_limit: self.config.balance_floor(),
                    fees: self.config.fees(),
                    pending_tx_limit: self.config.pending_tx_limit,
                    max_concurrent_branches: self.config.max_concurrent_branches,
                    shutdown_grace: self.config.shutdown_grace(),
                },
            )),
            LoadPatternKind::FixedDestination => {
                Box::new(FixedDestinationLoop::new(ledger, keys, self.config.fees()))
            }
        }
    }
}

/// Print a status line every `interval` until `done` fires.
fn spawn_progress_reporter(
    stats: Arc<StatsAggregator>,
    interval: Duration,
    done: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = stats.snapshot();
                    println!("[{:>4}s] {}", snapshot.elapsed.as_secs(), snapshot);
                }
            }
        }
    })
}

/// Report generated after a benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub duration: Duration,
    pub pattern: &'static str,
    pub stats: StatsSnapshot,
    pub outcome: PatternReport,
}

impl BenchmarkReport {
    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== Ledger TPS Report ===");
        println!("Pattern: {}", self.pattern);
        println!("Duration: {:?}", self.duration);

        match &self.outcome {
            PatternReport::FanOut(dist) => {
                println!("Submitted: {}", self.stats.submitted);
                println!("Finished: {}", self.stats.finished);
                println!("Pending: {}", self.stats.pending);
                println!("Failed sends: {}", self.stats.send_failures);
                println!("Failed confirmations: {}", self.stats.confirmation_failures);
                println!("Max TPS: {:.2}", self.stats.max_tps);
                println!("Max pending: {}", self.stats.max_pending);
                println!("Max wait: {:.3}s", self.stats.max_wait.as_secs_f64());
                println!("Avg TPS: {:.2}", self.stats.average_tps);
                println!(
                    "Branches: {} (below floor: {}, aborted: {}, throttled children: {}, cancelled: {}, abandoned: {})",
                    dist.branches,
                    dist.below_floor,
                    dist.aborted,
                    dist.throttled,
                    dist.cancelled,
                    dist.abandoned
                );
            }
            PatternReport::FixedDestination(fixed) => {
                let secs = self.duration.as_secs_f64();
                let rate = if secs > 0.0 {
                    fixed.submitted as f64 / secs
                } else {
                    0.0
                };
                if let Some(destination) = fixed.destination {
                    println!("Destination: {destination}");
                }
                println!("Submitted: {}", fixed.submitted);
                println!("Failed sends: {}", fixed.failed);
                println!("Submit rate: {rate:.2}/s");
            }
        }
    }
}
