//! Transient-failure retry.
//!
//! Only local address exhaustion is retried (see
//! [`LedgerError::is_transient`]); every other error surfaces on the first
//! attempt. [`Retrying`] applies a [`RetryPolicy`] to every call of a wrapped
//! [`LedgerClient`].

use async_trait::async_trait;
use ledger_tps_ledger::{
    Address, Confirmation, LedgerClient, LedgerError, PrivateKeySigner, Transfer, TxHash, U256,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Total attempts, first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fixed-delay retry of transient ledger errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// No delay follows the last attempt.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    debug!(operation, attempt, error = %e, "Transient ledger error, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(operation, attempts = attempt, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// A [`LedgerClient`] whose every call goes through a [`RetryPolicy`].
pub struct Retrying<L> {
    inner: L,
    policy: RetryPolicy,
}

impl<L: LedgerClient> Retrying<L> {
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for Retrying<L> {
    async fn network_id(&self) -> Result<u64, LedgerError> {
        self.policy
            .run("network_id", || self.inner.network_id())
            .await
    }

    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError> {
        self.policy
            .run("balance_of", || self.inner.balance_of(address))
            .await
    }

    async fn nonce_of(&self, address: Address) -> Result<u64, LedgerError> {
        self.policy
            .run("nonce_of", || self.inner.nonce_of(address))
            .await
    }

    /// Retries resend the same signed transfer; the nonce is not re-read.
    async fn submit(
        &self,
        transfer: &Transfer,
        signer: &PrivateKeySigner,
    ) -> Result<TxHash, LedgerError> {
        self.policy
            .run("submit", || self.inner.submit(transfer, signer))
            .await
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, LedgerError> {
        self.policy
            .run("await_confirmation", || self.inner.await_confirmation(tx_hash))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_tps_ledger_memory::{test_account, MemoryLedger, Operation};
    use std::sync::Arc;
    use tokio::time::Instant;
    use tracing_test::traced_test;

    fn exhausted() -> LedgerError {
        LedgerError::AddressExhausted("connect: cannot assign requested address".into())
    }

    fn retrying(ledger: &Arc<MemoryLedger>) -> Retrying<Arc<MemoryLedger>> {
        Retrying::new(Arc::clone(ledger), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.inject_failures(Operation::Balance, 3, exhausted());
        let client = retrying(&ledger);

        let start = Instant::now();
        let balance = client.balance_of(test_account(1).address()).await.unwrap();

        assert_eq!(balance, U256::ZERO);
        assert_eq!(ledger.calls(Operation::Balance), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_submit_keeps_its_nonce() {
        let alice = test_account(1);
        let ledger = Arc::new(MemoryLedger::new().with_balance(alice.address(), 100));
        ledger.inject_failures(Operation::Submit, 1, exhausted());
        let client = retrying(&ledger);

        let transfer = Transfer {
            from: alice.address(),
            to: test_account(2).address(),
            amount: U256::from(10),
            nonce: 0,
            fees: ledger_tps_ledger::FeeParams {
                gas_limit: 21_000,
                gas_price: 1,
            },
        };
        client.submit(&transfer, alice.signer()).await.unwrap();

        assert_eq!(ledger.calls(Operation::Submit), 2);
        assert_eq!(ledger.calls(Operation::Nonce), 0);
        assert_eq!(ledger.submissions(), vec![transfer]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_ceiling_without_trailing_delay() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.inject_failures(Operation::Nonce, 40, exhausted());
        let client = retrying(&ledger);

        let start = Instant::now();
        let err = client
            .nonce_of(test_account(1).address())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(ledger.calls(Operation::Nonce), 30);
        assert_eq!(start.elapsed(), Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.inject_failures(
            Operation::NetworkId,
            1,
            LedgerError::Transport("connection refused".into()),
        );
        let client = retrying(&ledger);

        let start = Instant::now();
        let err = client.network_id().await.unwrap_err();

        assert_eq!(err, LedgerError::Transport("connection refused".into()));
        assert_eq!(ledger.calls(Operation::NetworkId), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempt_policy_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::from_secs(1),
        };
        let mut calls = 0;
        let result: Result<(), _> = policy
            .run("probe", || {
                calls += 1;
                async { Err(exhausted()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_retry_is_logged() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.inject_failures(Operation::Confirm, 1, exhausted());
        ledger.inject_failures(Operation::Confirm, 1, LedgerError::Reverted(TxHash::ZERO));
        let client = retrying(&ledger);

        let err = client.await_confirmation(TxHash::ZERO).await.unwrap_err();

        assert_eq!(err, LedgerError::Reverted(TxHash::ZERO));
        assert!(logs_contain("Transient ledger error, retrying"));
    }
}
