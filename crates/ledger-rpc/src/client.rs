//! HTTP JSON-RPC client.

use crate::encoding::encode_transfer;
use crate::map_transport_error;
use alloy_network::ReceiptResponse;
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use ledger_tps_ledger::{Confirmation, LedgerClient, LedgerError, Transfer};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Connection settings for [`RpcLedger`].
#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    /// JSON-RPC endpoint URL.
    pub endpoint: String,
    /// Interval between receipt polls while waiting for confirmation.
    pub poll_interval: Duration,
    /// Give up waiting for a receipt after this long. `None` waits forever.
    pub confirmation_timeout: Option<Duration>,
}

impl RpcLedgerConfig {
    /// Settings for `endpoint` with a 1s poll and no confirmation bound.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            poll_interval: Duration::from_secs(1),
            confirmation_timeout: None,
        }
    }
}

/// Ledger client backed by an Ethereum-compatible JSON-RPC endpoint.
///
/// The underlying provider is connection-pooled and safe to share across
/// tasks.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    provider: RootProvider,
    chain_id: u64,
    config: RpcLedgerConfig,
}

impl RpcLedger {
    /// Connect to the endpoint and read its chain id.
    pub async fn dial(config: RpcLedgerConfig) -> Result<Self, LedgerError> {
        let url: url::Url =
            config
                .endpoint
                .parse()
                .map_err(|e: url::ParseError| LedgerError::InvalidEndpoint {
                    endpoint: config.endpoint.clone(),
                    reason: e.to_string(),
                })?;

        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(url);

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(map_transport_error)?;

        debug!(endpoint = %config.endpoint, chain_id, "Connected to ledger endpoint");

        Ok(Self {
            provider,
            chain_id,
            config,
        })
    }

    /// Chain id used for transaction signing.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn network_id(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_net_version()
            .await
            .map_err(map_transport_error)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(map_transport_error)
    }

    async fn nonce_of(&self, address: Address) -> Result<u64, LedgerError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(map_transport_error)
    }

    async fn submit(
        &self,
        transfer: &Transfer,
        signer: &PrivateKeySigner,
    ) -> Result<TxHash, LedgerError> {
        let (tx_hash, raw) = encode_transfer(self.chain_id, transfer, signer)?;

        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(map_transport_error)?;

        trace!(tx_hash = %tx_hash, nonce = transfer.nonce, "Transaction broadcast");
        Ok(*pending.tx_hash())
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, LedgerError> {
        let started = Instant::now();

        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.status() {
                        return Err(LedgerError::Reverted(tx_hash));
                    }
                    return Ok(Confirmation {
                        tx_hash,
                        block_number: receipt.block_number(),
                        gas_used: receipt.gas_used(),
                    });
                }
                Ok(None) => {
                    trace!(tx_hash = %tx_hash, "Transaction not yet mined");
                }
                // Receipt lookups keep polling through errors; only the bound ends the wait.
                Err(e) => {
                    debug!(tx_hash = %tx_hash, error = %e, "Receipt retrieval failed");
                }
            }

            if let Some(limit) = self.config.confirmation_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    return Err(LedgerError::ConfirmationTimeout { tx_hash, waited });
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
