//! # In-Memory Ledger
//!
//! [`LedgerClient`](ledger_tps_ledger::LedgerClient) implementation that keeps
//! balances and nonces in process memory, for deterministic tests of the load
//! generator.
//!
//! Beyond plain transfer bookkeeping it can:
//!
//! - delay confirmations (driven by tokio time, so paused-clock tests work)
//! - charge `gas_limit * gas_price` on every transfer
//! - fail the next N calls of a given [`Operation`] with a scripted error
//! - run hooks on every submit and confirmation
//! - record every accepted [`Transfer`](ledger_tps_ledger::Transfer)

mod ledger;

pub use ledger::{test_account, ConfirmHook, MemoryLedger, Operation, SubmitHook};
