//! Recursive fund distribution.
//!
//! Starting from the root account, every branch splits its surplus above the
//! balance floor between [`FAN_OUT`] fresh accounts, waits for each transfer
//! to be mined, and hands each funded child back to a shared worklist where it
//! becomes a branch of its own. The tree stops growing when balances sink
//! under the floor, when the pending ceiling suppresses recursion, or when the
//! run is cancelled.
//!
//! The worklist is drained by a bounded pool: a semaphore caps how many
//! branches run at once. On cancellation no branch starts another send, and
//! in-flight confirmations get [`DistributionSettings::shutdown_grace`] to
//! finish before the remaining tasks are aborted.

mod branch;

pub use branch::{
    should_recurse, split_amount, BranchOutcome, BranchReport, DistributionSettings, FAN_OUT,
};

use crate::accounts::KeySupply;
use crate::stats::StatsAggregator;
use branch::{run_branch, BranchContext};
use ledger_tps_ledger::{Account, LedgerClient};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Totals over every branch of a distribution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionReport {
    pub branches: u64,
    pub sends: u64,
    pub spawned: u64,
    pub below_floor: u64,
    pub aborted: u64,
    pub throttled: u64,
    pub cancelled: u64,
    /// Branches still running when the drain grace ran out.
    pub abandoned: u64,
}

impl DistributionReport {
    fn absorb(&mut self, joined: Result<BranchReport, JoinError>) {
        let branch = match joined {
            Ok(branch) => branch,
            Err(e) if e.is_cancelled() => {
                self.abandoned += 1;
                return;
            }
            Err(e) => {
                warn!(error = %e, "Branch task panicked");
                self.aborted += 1;
                self.branches += 1;
                return;
            }
        };

        self.branches += 1;
        self.sends += branch.sends;
        self.spawned += branch.spawned;
        self.throttled += branch.throttled;
        match branch.outcome {
            BranchOutcome::BelowFloor => self.below_floor += 1,
            BranchOutcome::Aborted => self.aborted += 1,
            BranchOutcome::Cancelled => self.cancelled += 1,
            BranchOutcome::Distributed => {}
        }
    }
}

/// Drives a distribution tree from a root account.
pub struct DistributionEngine<L> {
    ledger: Arc<L>,
    keys: KeySupply,
    stats: Arc<StatsAggregator>,
    settings: Arc<DistributionSettings>,
}

impl<L: LedgerClient> DistributionEngine<L> {
    pub fn new(
        ledger: Arc<L>,
        keys: KeySupply,
        stats: Arc<StatsAggregator>,
        settings: DistributionSettings,
    ) -> Self {
        Self {
            ledger,
            keys,
            stats,
            settings: Arc::new(settings),
        }
    }

    /// Distribute from `root` until the tree is exhausted or `cancel` fires,
    /// then drain.
    pub async fn run(&self, root: Account, cancel: CancellationToken) -> DistributionReport {
        let ctx = BranchContext {
            ledger: Arc::clone(&self.ledger),
            keys: self.keys.clone(),
            stats: Arc::clone(&self.stats),
            settings: Arc::clone(&self.settings),
            cancel: cancel.clone(),
        };

        let (worklist, mut queue) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_branches.max(1)));
        let mut branches = JoinSet::new();
        let mut report = DistributionReport::default();

        info!(
            root = %root.address(),
            balance_limit = %self.settings.balance_limit,
            pending_tx_limit = self.settings.pending_tx_limit,
            max_concurrent_branches = self.settings.max_concurrent_branches,
            "Starting fan-out distribution"
        );
        // The receiver is alive, so this cannot fail.
        let _ = worklist.send(root);

        loop {
            // With nothing running, an empty queue means the tree is done.
            let next = if branches.is_empty() {
                match queue.try_recv() {
                    Ok(account) => Some(account),
                    Err(_) => break,
                }
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    Some(joined) = branches.join_next() => {
                        report.absorb(joined);
                        None
                    }
                    Some(account) = queue.recv() => Some(account),
                }
            };

            let Some(account) = next else { continue };
            if cancel.is_cancelled() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let ctx = ctx.clone();
            let worklist = worklist.clone();
            branches.spawn(async move {
                let _permit = permit;
                run_branch(ctx, account, worklist).await
            });
        }

        drop(worklist);
        self.drain(&mut branches, &mut report).await;

        info!(
            branches = report.branches,
            sends = report.sends,
            below_floor = report.below_floor,
            aborted = report.aborted,
            throttled = report.throttled,
            cancelled = report.cancelled,
            abandoned = report.abandoned,
            "Distribution finished"
        );
        report
    }

    async fn drain(
        &self,
        branches: &mut JoinSet<BranchReport>,
        report: &mut DistributionReport,
    ) {
        if branches.is_empty() {
            return;
        }

        let grace = self.settings.shutdown_grace;
        debug!(in_flight = branches.len(), ?grace, "Draining branches");

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = branches.join_next().await {
                report.absorb(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                in_flight = branches.len(),
                ?grace,
                "Drain grace exceeded, aborting remaining branches"
            );
            branches.abort_all();
            while let Some(joined) = branches.join_next().await {
                report.absorb(joined);
            }
        }
    }
}
