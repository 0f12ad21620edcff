//! Ledger error taxonomy.
//!
//! Errors are split into two classes:
//!
//! - **Transient**: the local host ran out of ephemeral ports or addresses
//!   ([`LedgerError::AddressExhausted`]). The request never reached the ledger,
//!   so retrying after a short pause is safe.
//! - **Terminal**: everything else. Transport failures, ledger rejections,
//!   reverted or unconfirmed transactions. The caller abandons the operation.

use alloy_primitives::TxHash;
use std::io;
use std::time::Duration;

/// Message fragment the OS reports when no local address/port can be bound.
const ADDRESS_EXHAUSTED_MESSAGE: &str = "cannot assign requested address";

/// Errors returned by a [`LedgerClient`](crate::LedgerClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The local host could not assign an address for a new connection.
    #[error("local address exhausted: {0}")]
    AddressExhausted(String),

    /// Connection, HTTP or decoding failure talking to the endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// The ledger answered with an error (bad nonce, insufficient funds, ...).
    #[error("ledger rejected request: {0}")]
    Rejected(String),

    /// The transaction was mined but failed.
    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    /// No receipt appeared within the configured bound.
    #[error("transaction {tx_hash} not confirmed within {waited:?}")]
    ConfirmationTimeout {
        /// Transaction being waited on.
        tx_hash: TxHash,
        /// How long the client waited.
        waited: Duration,
    },

    /// The transaction could not be signed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The endpoint URL could not be used.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Why it was refused.
        reason: String,
    },
}

impl LedgerError {
    /// Whether the error is worth retrying after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::AddressExhausted(_))
    }

    /// Classify an arbitrary transport-level error.
    ///
    /// Walks the `source()` chain looking for an OS-level "address not
    /// available" condition, either as an [`io::Error`] kind or by message.
    /// Anything else becomes [`LedgerError::Transport`].
    pub fn from_transport(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut current = Some(err);
        while let Some(cause) = current {
            if is_address_exhausted(cause) {
                return LedgerError::AddressExhausted(err.to_string());
            }
            current = cause.source();
        }
        LedgerError::Transport(err.to_string())
    }
}

fn is_address_exhausted(err: &(dyn std::error::Error + 'static)) -> bool {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        if io_err.kind() == io::ErrorKind::AddrNotAvailable {
            return true;
        }
    }
    message_indicates_exhaustion(&err.to_string())
}

fn message_indicates_exhaustion(message: &str) -> bool {
    message
        .to_ascii_lowercase()
        .contains(ADDRESS_EXHAUSTED_MESSAGE)
}
