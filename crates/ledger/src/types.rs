//! Transaction types exchanged with a ledger client.

use alloy_primitives::{Address, TxHash, U256};

/// Fee parameters attached to every transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    /// Gas limit per transaction.
    pub gas_limit: u64,
    /// Gas price per unit of gas.
    pub gas_price: u128,
}

impl FeeParams {
    /// Upper bound of the fee a transfer can be charged.
    pub fn max_fee(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.gas_price)
    }
}

/// A value transfer, described by its semantic fields only.
///
/// Signing and wire encoding are left to the ledger client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Sending account.
    pub from: Address,
    /// Receiving account.
    pub to: Address,
    /// Amount moved.
    pub amount: U256,
    /// Nonce of the sender for this transaction.
    pub nonce: u64,
    /// Gas limit and price.
    pub fees: FeeParams,
}

/// Receipt data for a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Hash of the confirmed transaction.
    pub tx_hash: TxHash,
    /// Block the transaction was included in, if the ledger reports it.
    pub block_number: Option<u64>,
    /// Gas consumed.
    pub gas_used: u64,
}
