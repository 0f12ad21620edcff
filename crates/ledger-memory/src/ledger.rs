//! In-memory ledger state and the client implementation over it.

use alloy_primitives::{keccak256, Address, TxHash, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use ledger_tps_ledger::{Account, Confirmation, LedgerClient, LedgerError, Transfer};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::trace;

/// Network id reported unless overridden.
const DEFAULT_NETWORK_ID: u64 = 1337;

/// Called with every accepted transfer, after state has been updated.
pub type SubmitHook = Box<dyn Fn(&Transfer) + Send + Sync>;

/// Called with the 1-based sequence number of every confirmation, before the
/// confirmation is returned to the caller.
pub type ConfirmHook = Box<dyn Fn(u64) + Send + Sync>;

/// Ledger operations that can be counted and scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    NetworkId,
    Balance,
    Nonce,
    Submit,
    Confirm,
}

#[derive(Default)]
struct State {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    pending: HashMap<TxHash, Transfer>,
    confirmed: HashMap<TxHash, Confirmation>,
    submissions: Vec<Transfer>,
    confirmations: u64,
    calls: HashMap<Operation, u64>,
    failures: HashMap<Operation, VecDeque<LedgerError>>,
}

/// A ledger that lives entirely in memory.
///
/// Every submitted transfer is applied immediately; [`await_confirmation`]
/// only models the mining delay.
///
/// [`await_confirmation`]: LedgerClient::await_confirmation
pub struct MemoryLedger {
    network_id: u64,
    confirmation_delay: Duration,
    charge_fees: bool,
    on_submit: Option<SubmitHook>,
    on_confirm: Option<ConfirmHook>,
    state: Mutex<State>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Empty ledger: no balances, instant confirmations, no fees.
    pub fn new() -> Self {
        Self {
            network_id: DEFAULT_NETWORK_ID,
            confirmation_delay: Duration::ZERO,
            charge_fees: false,
            on_submit: None,
            on_confirm: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Credit `address` with `balance`.
    pub fn with_balance(self, address: Address, balance: u64) -> Self {
        self.state
            .lock()
            .balances
            .insert(address, U256::from(balance));
        self
    }

    pub fn with_network_id(mut self, network_id: u64) -> Self {
        self.network_id = network_id;
        self
    }

    /// Delay every confirmation by `delay`.
    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// Charge `gas_limit * gas_price` on top of the amount of every transfer.
    pub fn with_fees(mut self) -> Self {
        self.charge_fees = true;
        self
    }

    pub fn on_submit(mut self, hook: impl Fn(&Transfer) + Send + Sync + 'static) -> Self {
        self.on_submit = Some(Box::new(hook));
        self
    }

    pub fn on_confirm(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_confirm = Some(Box::new(hook));
        self
    }

    /// Fail the next `times` calls of `operation` with `error`.
    ///
    /// Scripted failures queue up behind any already injected for the same
    /// operation.
    pub fn inject_failures(&self, operation: Operation, times: usize, error: LedgerError) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(operation).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Number of times `operation` has been invoked, failed calls included.
    pub fn calls(&self, operation: Operation) -> u64 {
        self.state
            .lock()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Every accepted transfer, in submission order.
    pub fn submissions(&self) -> Vec<Transfer> {
        self.state.lock().submissions.clone()
    }

    /// Transfers accepted but not yet confirmed.
    pub fn unconfirmed(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Current balance without going through the client interface.
    pub fn balance(&self, address: Address) -> U256 {
        self.state
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    /// Count the call and pop a scripted failure, if any.
    fn begin(&self, operation: Operation) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        match state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn transfer_hash(from: Address, nonce: u64) -> TxHash {
    let mut preimage = [0u8; 28];
    preimage[..20].copy_from_slice(from.as_slice());
    preimage[20..].copy_from_slice(&nonce.to_be_bytes());
    keccak256(preimage)
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn network_id(&self) -> Result<u64, LedgerError> {
        self.begin(Operation::NetworkId)?;
        Ok(self.network_id)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError> {
        self.begin(Operation::Balance)?;
        Ok(self.balance(address))
    }

    async fn nonce_of(&self, address: Address) -> Result<u64, LedgerError> {
        self.begin(Operation::Nonce)?;
        Ok(self
            .state
            .lock()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or(0))
    }

    async fn submit(
        &self,
        transfer: &Transfer,
        signer: &PrivateKeySigner,
    ) -> Result<TxHash, LedgerError> {
        self.begin(Operation::Submit)?;

        if signer.address() != transfer.from {
            return Err(LedgerError::Signing(format!(
                "signer {} does not own sender {}",
                signer.address(),
                transfer.from
            )));
        }

        let tx_hash = {
            let mut state = self.state.lock();

            let expected = state.nonces.get(&transfer.from).copied().unwrap_or(0);
            if transfer.nonce != expected {
                return Err(LedgerError::Rejected(format!(
                    "invalid nonce: expected {expected}, got {}",
                    transfer.nonce
                )));
            }

            let fee = if self.charge_fees {
                transfer.fees.max_fee()
            } else {
                U256::ZERO
            };
            let cost = transfer.amount.saturating_add(fee);
            let balance = state
                .balances
                .get(&transfer.from)
                .copied()
                .unwrap_or_default();
            if balance < cost {
                return Err(LedgerError::Rejected(format!(
                    "insufficient funds: balance {balance}, cost {cost}"
                )));
            }

            state.balances.insert(transfer.from, balance - cost);
            *state.balances.entry(transfer.to).or_default() += transfer.amount;
            state.nonces.insert(transfer.from, expected + 1);

            let tx_hash = transfer_hash(transfer.from, transfer.nonce);
            state.pending.insert(tx_hash, transfer.clone());
            state.submissions.push(transfer.clone());
            tx_hash
        };

        trace!(tx_hash = %tx_hash, from = %transfer.from, nonce = transfer.nonce, "Transfer applied");

        if let Some(hook) = &self.on_submit {
            hook(transfer);
        }
        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, LedgerError> {
        self.begin(Operation::Confirm)?;

        if !self.confirmation_delay.is_zero() {
            tokio::time::sleep(self.confirmation_delay).await;
        }

        let (confirmation, sequence) = {
            let mut state = self.state.lock();
            if let Some(existing) = state.confirmed.get(&tx_hash) {
                return Ok(existing.clone());
            }
            let Some(transfer) = state.pending.remove(&tx_hash) else {
                return Err(LedgerError::Rejected(format!(
                    "unknown transaction {tx_hash}"
                )));
            };
            state.confirmations += 1;
            let confirmation = Confirmation {
                tx_hash,
                block_number: Some(state.confirmations),
                gas_used: transfer.fees.gas_limit,
            };
            state.confirmed.insert(tx_hash, confirmation.clone());
            (confirmation, state.confirmations)
        };

        if let Some(hook) = &self.on_confirm {
            hook(sequence);
        }
        Ok(confirmation)
    }
}

/// Deterministic account derived from a repeated non-zero seed byte.
///
/// # Panics
///
/// Panics if `seed` is zero.
pub fn test_account(seed: u8) -> Account {
    assert_ne!(seed, 0, "seed must be non-zero");
    let signer = PrivateKeySigner::from_bytes(&B256::repeat_byte(seed))
        .expect("repeated non-zero byte is a valid secp256k1 scalar");
    Account::from_signer(signer)
}
