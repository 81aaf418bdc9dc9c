//! Tenderly test network execution
//!
//! When a dedicated test network is configured, transactions are not
//! simulated: they are sent with `eth_sendTransaction` (the node holds the
//! keys), and the mined receipt decides the outcome. State advances with
//! each confirmed transaction, so there is no tip to track.

use alloy_primitives::{B256, U64};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{Result, SimulationError};
use super::types::{SimulationResult, TxParams};

/// Gas offered to every test network transaction (5,000,000)
pub const TESTNET_GAS_LIMIT: u64 = 5_000_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptStatus {
    status: Option<U64>,
    gas_used: U64,
}

/// JSON-RPC handle on a test network
#[derive(Clone)]
pub struct TestnetRpc {
    url: String,
    provider: DynProvider,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl std::fmt::Debug for TestnetRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestnetRpc")
            .field("url", &self.url)
            .field("poll_interval", &self.poll_interval)
            .field("wait_timeout", &self.wait_timeout)
            .finish()
    }
}

impl TestnetRpc {
    pub fn connect(url: &str, poll_interval: Duration, wait_timeout: Duration) -> Result<Self> {
        let rpc_url: reqwest::Url = url.parse().map_err(|e| {
            SimulationError::Configuration(format!("invalid test network url {}: {}", url, e))
        })?;
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();

        Ok(Self {
            url: url.to_string(),
            provider,
            poll_interval,
            wait_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `tx` and wait for it to be mined, translating the receipt
    pub async fn execute(&self, tx: &TxParams) -> SimulationResult {
        match self.send_and_wait(tx).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Test network execution failed: {}", e);
                SimulationResult::failed(e.to_string())
            }
        }
    }

    async fn send_and_wait(&self, tx: &TxParams) -> Result<SimulationResult> {
        let hash = self.send_transaction(tx).await?;
        debug!("Sent test network transaction {}", hash);

        let receipt = tokio::time::timeout(self.wait_timeout, self.poll_receipt(hash))
            .await
            .map_err(|_| SimulationError::Timeout("eth_getTransactionReceipt", self.wait_timeout))??;

        let status: ReceiptStatus = serde_json::from_value(receipt.clone())?;
        if status.status == Some(U64::from(1u64)) {
            info!("Test network transaction {} mined, gas used {}", hash, status.gas_used);
            Ok(SimulationResult::succeeded(status.gas_used.to_string())
                .with_replay_url(hash.to_string())
                .with_transaction(receipt))
        } else {
            Ok(SimulationResult::failed(format!(
                "Transaction on testnet failed, hash: {}",
                hash
            )))
        }
    }

    async fn send_transaction(&self, tx: &TxParams) -> Result<B256> {
        let params = json!({
            "from": tx.from,
            "to": tx.to,
            "value": format!("{:#x}", tx.value_or_zero()),
            "data": tx.data,
            "gas": format!("{:#x}", TESTNET_GAS_LIMIT),
            "gasPrice": "0x0",
        });

        let hash = tokio::time::timeout(
            self.wait_timeout,
            self.provider
                .raw_request::<_, B256>("eth_sendTransaction".into(), (params,)),
        )
        .await
        .map_err(|_| SimulationError::Timeout("eth_sendTransaction", self.wait_timeout))??;

        Ok(hash)
    }

    async fn poll_receipt(&self, hash: B256) -> Result<Value> {
        loop {
            let receipt = self
                .provider
                .raw_request::<_, Option<Value>>("eth_getTransactionReceipt".into(), (hash,))
                .await?;

            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
