//! Ledger client interface for the TPS load generator.
//!
//! Defines the [`LedgerClient`] trait implemented by both the JSON-RPC backend
//! (`ledger-rpc`) and the in-memory backend (`ledger-memory`), together with
//! the semantic transaction types the load generator hands to a client.
//!
//! The load generator never encodes or signs transactions itself. It builds a
//! [`Transfer`] with sender, recipient, amount, fee parameters and nonce, and
//! passes it to [`LedgerClient::submit`] along with the sender's key.
//!
//! # Modules
//!
//! - [`account`]: funded accounts (address + signing key) and key parsing
//! - [`error`]: ledger error taxonomy with transient/terminal classification
//! - [`types`]: transfers and confirmation receipts

pub mod account;
pub mod error;
pub mod types;

pub use account::{Account, KeyError};
pub use alloy_primitives::{Address, TxHash, U256};
pub use alloy_signer_local::PrivateKeySigner;
pub use error::LedgerError;
pub use types::{Confirmation, FeeParams, Transfer};

use async_trait::async_trait;
use std::sync::Arc;

/// Operations the load generator needs from a ledger endpoint.
///
/// Implementations must be safe for concurrent use: a single handle is shared
/// by every distribution branch.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Identity of the connected network. Used as a startup health check.
    async fn network_id(&self) -> Result<u64, LedgerError>;

    /// Current balance of `address`.
    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError>;

    /// Next nonce to use for a transaction sent from `address`.
    async fn nonce_of(&self, address: Address) -> Result<u64, LedgerError>;

    /// Sign `transfer` with `signer` and broadcast it.
    async fn submit(
        &self,
        transfer: &Transfer,
        signer: &PrivateKeySigner,
    ) -> Result<TxHash, LedgerError>;

    /// Block until the transaction is mined, or fail.
    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, LedgerError>;
}

#[async_trait]
impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    async fn network_id(&self) -> Result<u64, LedgerError> {
        (**self).network_id().await
    }

    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError> {
        (**self).balance_of(address).await
    }

    async fn nonce_of(&self, address: Address) -> Result<u64, LedgerError> {
        (**self).nonce_of(address).await
    }

    async fn submit(
        &self,
        transfer: &Transfer,
        signer: &PrivateKeySigner,
    ) -> Result<TxHash, LedgerError> {
        (**self).submit(transfer, signer).await
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, LedgerError> {
        (**self).await_confirmation(tx_hash).await
    }
}
