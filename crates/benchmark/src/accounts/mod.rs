//! Fresh-account supply.
//!
//! A dedicated OS thread generates key pairs and pushes them into a bounded
//! channel, blocking while the buffer is full. Branches pull from the shared
//! receiver. The producer stops once every [`KeySupply`] handle is dropped.

use ledger_tps_ledger::{Account, KeyError};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Default number of pre-generated accounts held in the buffer.
pub const DEFAULT_KEY_BUFFER: usize = 1000;

/// Multi-consumer handle onto the stream of fresh accounts.
#[derive(Clone)]
pub struct KeySupply {
    receiver: Arc<Mutex<mpsc::Receiver<Account>>>,
}

impl KeySupply {
    /// Start the background generator with a buffer of `capacity` accounts.
    pub fn spawn(capacity: usize) -> Result<Self, KeyError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        std::thread::Builder::new()
            .name("key-supply".into())
            .spawn(move || {
                let mut generated: u64 = 0;
                while tx.blocking_send(Account::random()).is_ok() {
                    generated += 1;
                }
                debug!(generated, "Key supply stopped");
            })?;

        Ok(Self::from_receiver(rx))
    }

    /// A finite supply of the given accounts, in order.
    pub fn preloaded(accounts: Vec<Account>) -> Self {
        let (tx, rx) = mpsc::channel(accounts.len().max(1));
        for account in accounts {
            // Capacity covers every account, so this never fails.
            let _ = tx.try_send(account);
        }
        Self::from_receiver(rx)
    }

    fn from_receiver(receiver: mpsc::Receiver<Account>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Take the next fresh account, waiting for the generator if needed.
    pub async fn next(&self) -> Result<Account, KeyError> {
        self.receiver
            .lock()
            .await
            .recv()
            .await
            .ok_or(KeyError::SupplyClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_generated_accounts_are_unique() {
        let supply = KeySupply::spawn(8).unwrap();

        let mut seen = HashSet::new();
        for _ in 0..32 {
            let account = supply.next().await.unwrap();
            assert!(seen.insert(account.address()));
        }
    }

    #[tokio::test]
    async fn test_preloaded_supply_runs_dry() {
        let first = Account::random();
        let expected = first.address();
        let supply = KeySupply::preloaded(vec![first]);

        assert_eq!(supply.next().await.unwrap().address(), expected);
        assert!(matches!(supply.next().await, Err(KeyError::SupplyClosed)));
    }

    #[tokio::test]
    async fn test_clones_share_one_stream() {
        let accounts: Vec<_> = (0..4).map(|_| Account::random()).collect();
        let supply = KeySupply::preloaded(accounts);
        let other = supply.clone();

        let mut seen = HashSet::new();
        for _ in 0..2 {
            seen.insert(supply.next().await.unwrap().address());
            seen.insert(other.next().await.unwrap().address());
        }
        assert_eq!(seen.len(), 4);
        assert!(supply.next().await.is_err());
    }
}
