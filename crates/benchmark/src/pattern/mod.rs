//! Load patterns.
//!
//! A [`LoadPattern`] consumes the root account and drives load until it runs
//! out of work or is cancelled. Two are provided:
//!
//! - [`DistributionEngine`]: recursive fan-out (the default)
//! - [`FixedDestinationLoop`]: root account hammering one destination

mod fixed;

pub use fixed::{FixedDestinationLoop, FixedLoopReport};

use crate::distribution::{DistributionEngine, DistributionReport};
use async_trait::async_trait;
use ledger_tps_ledger::{Account, LedgerClient};
use tokio_util::sync::CancellationToken;

/// Outcome of a load pattern run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternReport {
    FanOut(DistributionReport),
    FixedDestination(FixedLoopReport),
}

/// A strategy for generating transfer load from a funded root account.
#[async_trait]
pub trait LoadPattern: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Generate load from `root` until done or `cancel` fires.
    async fn run(&self, root: Account, cancel: CancellationToken) -> PatternReport;
}

#[async_trait]
impl<L: LedgerClient> LoadPattern for DistributionEngine<L> {
    fn name(&self) -> &'static str {
        "fan-out"
    }

    async fn run(&self, root: Account, cancel: CancellationToken) -> PatternReport {
        PatternReport::FanOut(DistributionEngine::run(self, root, cancel).await)
    }
}
