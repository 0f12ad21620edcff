//! Transfer signing and EIP-2718 encoding.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Bytes, TxHash, TxKind};
use alloy_signer_local::PrivateKeySigner;
use ledger_tps_ledger::{LedgerError, Transfer};

/// Sign `transfer` as an EIP-155 legacy transaction and encode it for
/// `eth_sendRawTransaction`.
///
/// Returns the transaction hash alongside the raw bytes.
pub fn encode_transfer(
    chain_id: u64,
    transfer: &Transfer,
    signer: &PrivateKeySigner,
) -> Result<(TxHash, Vec<u8>), LedgerError> {
    let mut tx = TxLegacy {
        chain_id: Some(chain_id),
        nonce: transfer.nonce,
        gas_price: transfer.fees.gas_price,
        gas_limit: transfer.fees.gas_limit,
        to: TxKind::Call(transfer.to),
        value: transfer.amount,
        input: Bytes::new(),
    };

    let signature = signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| LedgerError::Signing(e.to_string()))?;

    let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
    let tx_hash = *envelope.tx_hash();

    Ok((tx_hash, envelope.encoded_2718()))
}
