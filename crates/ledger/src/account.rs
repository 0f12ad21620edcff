//! Funded accounts.
//!
//! An [`Account`] pairs a signing key with its derived address. Accounts are
//! deliberately not `Clone`: a fresh account is owned by exactly one
//! distribution branch, and moving it is what keeps its nonce sequence
//! single-writer.

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use std::fmt;

/// Errors from parsing or producing keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("private key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("private key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("private key is not a valid secp256k1 scalar: {0}")]
    InvalidScalar(String),

    #[error("key supply closed")]
    SupplyClosed,

    #[error("failed to start key generator: {0}")]
    Generator(#[from] std::io::Error),
}

/// A key pair and the address derived from it.
pub struct Account {
    signer: PrivateKeySigner,
    address: Address,
}

impl Account {
    /// Generate a fresh random account.
    pub fn random() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// Wrap an existing signer.
    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self { signer, address }
    }

    /// Parse a hex-encoded private key, with or without a `0x` prefix.
    pub fn from_hex_key(key: &str) -> Result<Self, KeyError> {
        let trimmed = key.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(hex_part)?;
        if bytes.len() != 32 {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| KeyError::InvalidScalar(e.to_string()))?;
        Ok(Self::from_signer(signer))
    }

    /// The account address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The signing key.
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (first anvil/hardhat account).
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_parse_hex_key_with_and_without_prefix() {
        let expected: Address = DEV_ADDRESS.parse().unwrap();

        let plain = Account::from_hex_key(DEV_KEY).unwrap();
        let prefixed = Account::from_hex_key(&format!("0x{DEV_KEY}")).unwrap();

        assert_eq!(plain.address(), expected);
        assert_eq!(prefixed.address(), expected);
    }

    #[test]
    fn test_reject_malformed_keys() {
        assert!(matches!(
            Account::from_hex_key("zz"),
            Err(KeyError::InvalidHex(_))
        ));
        assert!(matches!(
            Account::from_hex_key("abcd"),
            Err(KeyError::InvalidLength(2))
        ));
        assert!(matches!(
            Account::from_hex_key(&"00".repeat(32)),
            Err(KeyError::InvalidScalar(_))
        ));
    }

    #[test]
    fn test_random_accounts_are_distinct() {
        let a = Account::random();
        let b = Account::random();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_debug_does_not_print_key() {
        let account = Account::from_hex_key(DEV_KEY).unwrap();
        let rendered = format!("{account:?}");
        assert!(!rendered.contains(DEV_KEY));
        assert!(rendered.contains("address"));
    }
}
