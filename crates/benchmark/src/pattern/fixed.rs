//! Fixed-destination transfer loop.

use super::{LoadPattern, PatternReport};
use crate::accounts::KeySupply;
use async_trait::async_trait;
use ledger_tps_ledger::{Account, Address, FeeParams, LedgerClient, Transfer, U256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLoopReport {
    /// `None` if the loop never got a destination.
    pub destination: Option<Address>,
    pub submitted: u64,
    pub failed: u64,
    /// Nonce the next transfer would have used.
    pub next_nonce: u64,
}

/// Sends amount-1 transfers from the root account to a single fresh
/// destination, as fast as submission allows.
///
/// The root nonce is read once and then advanced locally, including past
/// failed submissions. Confirmations are not awaited and nothing is reported
/// to the statistics aggregator.
pub struct FixedDestinationLoop<L> {
    ledger: Arc<L>,
    keys: KeySupply,
    fees: FeeParams,
}

impl<L: LedgerClient> FixedDestinationLoop<L> {
    pub fn new(ledger: Arc<L>, keys: KeySupply, fees: FeeParams) -> Self {
        Self { ledger, keys, fees }
    }
}

#[async_trait]
impl<L: LedgerClient> LoadPattern for FixedDestinationLoop<L> {
    fn name(&self) -> &'static str {
        "fixed-destination"
    }

    async fn run(&self, root: Account, cancel: CancellationToken) -> PatternReport {
        let mut report = FixedLoopReport {
            destination: None,
            submitted: 0,
            failed: 0,
            next_nonce: 0,
        };

        let destination = match self.keys.next().await {
            Ok(account) => account.address(),
            Err(e) => {
                warn!(error = %e, "No destination account available");
                return PatternReport::FixedDestination(report);
            }
        };
        report.destination = Some(destination);

        let mut nonce = match self.ledger.nonce_of(root.address()).await {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!(account = %root.address(), error = %e, "Nonce query failed");
                return PatternReport::FixedDestination(report);
            }
        };

        info!(from = %root.address(), to = %destination, start_nonce = nonce, "Starting fixed-destination loop");

        while !cancel.is_cancelled() {
            let transfer = Transfer {
                from: root.address(),
                to: destination,
                amount: U256::from(1),
                nonce,
                fees: self.fees,
            };

            match self.ledger.submit(&transfer, root.signer()).await {
                Ok(_) => report.submitted += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(nonce, error = %e, "Transfer submission failed");
                }
            }
            nonce += 1;

            // Submission may complete without suspending; let timers and
            // the cancellation source run.
            tokio::task::yield_now().await;
        }

        report.next_nonce = nonce;
        PatternReport::FixedDestination(report)
    }
}
