//! # JSON-RPC Ledger Client
//!
//! [`LedgerClient`] implementation for Ethereum-compatible JSON-RPC endpoints.
//!
//! Transfers are encoded as EIP-155 legacy transactions using the chain id
//! read at dial time, signed locally with the sender's key and broadcast with
//! `eth_sendRawTransaction`. Confirmation polls `eth_getTransactionReceipt`
//! until a receipt appears.

mod client;
mod encoding;

pub use client::{RpcLedger, RpcLedgerConfig};
pub use encoding::encode_transfer;

use alloy_transport::TransportError;
use ledger_tps_ledger::LedgerError;

/// Map an alloy transport error onto the ledger error taxonomy.
///
/// JSON-RPC error responses come from the ledger itself and are terminal.
/// Everything else is classified by walking the error's source chain.
pub fn map_transport_error(err: TransportError) -> LedgerError {
    if let Some(payload) = err.as_error_resp() {
        return LedgerError::Rejected(payload.message.to_string());
    }
    LedgerError::from_transport(&err)
}
