//! A single distribution branch.

use crate::accounts::KeySupply;
use crate::stats::StatsAggregator;
use ledger_tps_ledger::{Account, Address, FeeParams, LedgerClient, Transfer, U256};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Children funded by every branch.
pub const FAN_OUT: u64 = 2;

/// Per-child amount for a branch holding `balance`, or `None` when the
/// balance is under `floor` and the branch should not send at all.
pub fn split_amount(balance: U256, floor: U256) -> Option<U256> {
    if balance < floor {
        return None;
    }
    Some((balance - floor) / U256::from(FAN_OUT))
}

/// Whether a freshly funded child may become a branch of its own.
pub fn should_recurse(pending: u64, pending_limit: u64) -> bool {
    pending <= pending_limit
}

/// Parameters shared by every branch of one run.
#[derive(Debug, Clone)]
pub struct DistributionSettings {
    /// Balance floor.
    pub balance_limit: U256,
    pub fees: FeeParams,
    /// Recursion is suppressed while more transactions than this are pending.
    pub pending_tx_limit: u64,
    pub max_concurrent_branches: usize,
    /// Drain bound for in-flight branches after cancellation.
    pub shutdown_grace: Duration,
}

/// How a branch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    /// Balance under the floor. Nothing sent.
    BelowFloor,
    /// Every child was funded.
    Distributed,
    /// A ledger or key-supply failure ended the branch early.
    Aborted,
    /// Cancellation arrived before every child was funded.
    Cancelled,
}

/// What one branch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchReport {
    pub account: Address,
    pub sends: u64,
    /// Children handed to the worklist.
    pub spawned: u64,
    /// Children funded but not recursed into because of backpressure.
    pub throttled: u64,
    pub outcome: BranchOutcome,
}

/// Everything a branch task needs, cheap to clone per task.
pub(crate) struct BranchContext<L> {
    pub ledger: Arc<L>,
    pub keys: KeySupply,
    pub stats: Arc<StatsAggregator>,
    pub settings: Arc<DistributionSettings>,
    pub cancel: CancellationToken,
}

impl<L> Clone for BranchContext<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            keys: self.keys.clone(),
            stats: Arc::clone(&self.stats),
            settings: Arc::clone(&self.settings),
            cancel: self.cancel.clone(),
        }
    }
}

/// Fund up to [`FAN_OUT`] fresh children from `account`, pushing each one
/// that may recurse onto `worklist`.
pub(crate) async fn run_branch<L: LedgerClient>(
    ctx: BranchContext<L>,
    account: Account,
    worklist: mpsc::UnboundedSender<Account>,
) -> BranchReport {
    let address = account.address();
    let mut report = BranchReport {
        account: address,
        sends: 0,
        spawned: 0,
        throttled: 0,
        outcome: BranchOutcome::Distributed,
    };

    let balance = match ctx.ledger.balance_of(address).await {
        Ok(balance) => balance,
        Err(e) => {
            warn!(account = %address, error = %e, "Balance query failed, abandoning branch");
            report.outcome = BranchOutcome::Aborted;
            return report;
        }
    };

    let Some(amount) = split_amount(balance, ctx.settings.balance_limit) else {
        debug!(account = %address, %balance, "Balance below floor");
        report.outcome = BranchOutcome::BelowFloor;
        return report;
    };

    for _ in 0..FAN_OUT {
        if ctx.cancel.is_cancelled() {
            report.outcome = BranchOutcome::Cancelled;
            return report;
        }

        let child = match ctx.keys.next().await {
            Ok(child) => child,
            Err(e) => {
                warn!(account = %address, error = %e, "No fresh account available");
                report.outcome = BranchOutcome::Aborted;
                return report;
            }
        };

        let nonce = match ctx.ledger.nonce_of(address).await {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!(account = %address, error = %e, "Nonce query failed, abandoning branch");
                report.outcome = BranchOutcome::Aborted;
                return report;
            }
        };

        let transfer = Transfer {
            from: address,
            to: child.address(),
            amount,
            nonce,
            fees: ctx.settings.fees,
        };

        let tx_hash = match ctx.ledger.submit(&transfer, account.signer()).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                ctx.stats.record_send_failed();
                warn!(account = %address, nonce, error = %e, "Transfer submission failed");
                report.outcome = BranchOutcome::Aborted;
                return report;
            }
        };
        report.sends += 1;

        let sent_at = Instant::now();
        let status = ctx.stats.record_submitted();
        debug!(%tx_hash, to = %transfer.to, %amount, "{status}");

        if let Err(e) = ctx.ledger.await_confirmation(tx_hash).await {
            ctx.stats.record_confirmation_failed();
            warn!(%tx_hash, error = %e, "Transfer not confirmed, abandoning branch");
            report.outcome = BranchOutcome::Aborted;
            return report;
        }

        let status = ctx.stats.record_confirmed(sent_at.elapsed());
        if !should_recurse(status.pending, ctx.settings.pending_tx_limit) {
            debug!(
                child = %transfer.to,
                pending = status.pending,
                limit = ctx.settings.pending_tx_limit,
                "Pending ceiling exceeded, not recursing"
            );
            report.throttled += 1;
            continue;
        }

        if ctx.cancel.is_cancelled() {
            continue;
        }
        if worklist.send(child).is_ok() {
            report.spawned += 1;
        }
    }

    if ctx.cancel.is_cancelled() && report.spawned + report.throttled < FAN_OUT {
        report.outcome = BranchOutcome::Cancelled;
    }
    report
}
