//! Ledger TPS Benchmark
//!
//! A library and CLI tool that drives sustained transfer throughput against
//! an Ethereum-compatible ledger by recursively splitting a funded account's
//! balance into fresh accounts.
//!
//! # Modules
//!
//! - [`accounts`]: background supply of fresh accounts (KeySupply)
//! - [`retry`]: transient-failure retry policy and ledger decorator
//! - [`stats`]: run-wide throughput statistics (StatsAggregator)
//! - [`distribution`]: the recursive fan-out engine
//! - [`pattern`]: load pattern trait and the fixed-destination loop
//! - [`runner`]: benchmark orchestrator
//! - [`config`]: configuration types

pub mod accounts;
pub mod config;
pub mod distribution;
pub mod pattern;
pub mod retry;
pub mod runner;
pub mod stats;

pub use accounts::KeySupply;
pub use config::{BenchmarkConfig, ConfigError, ConfigOverrides, LoadPatternKind};
pub use distribution::{DistributionEngine, DistributionReport, DistributionSettings};
pub use pattern::{FixedDestinationLoop, FixedLoopReport, LoadPattern, PatternReport};
pub use retry::{RetryPolicy, Retrying};
pub use runner::{Benchmark, BenchmarkError, BenchmarkReport};
pub use stats::{StatsAggregator, StatsSnapshot};
