//! eth_estimateGas backend
//!
//! The cheapest possible simulation: ask a node how much gas the call needs.
//! There is no session, no replay link and no way to apply state overrides;
//! overrides handed to this backend are ignored.

use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{Result, SimulationError};
use super::types::{SimulationResult, StateOverrides, TxParams};
use super::SimulationBackend;

pub struct EstimateGasBackend {
    rpc_url: String,
    provider: DynProvider,
    timeout: Duration,
}

impl EstimateGasBackend {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let url: reqwest::Url = rpc_url.parse().map_err(|e| {
            SimulationError::Configuration(format!("invalid RPC_URL {}: {}", rpc_url, e))
        })?;

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            provider: ProviderBuilder::new().connect_http(url).erased(),
            timeout,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn estimate(&self, tx: &TxParams) -> Result<u64> {
        let request = TransactionRequest::default()
            .from(tx.from)
            .to(tx.to)
            .value(tx.value_or_zero())
            .input(tx.data.clone().into());

        let gas = tokio::time::timeout(self.timeout, async {
            self.provider.estimate_gas(request).await
        })
        .await
        .map_err(|_| SimulationError::Timeout("eth_estimateGas", self.timeout))??;

        Ok(gas)
    }
}

#[async_trait]
impl SimulationBackend for EstimateGasBackend {
    fn name(&self) -> &'static str {
        "estimate-gas"
    }

    fn supports_overrides(&self) -> bool {
        false
    }

    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn simulate(
        &mut self,
        tx: &TxParams,
        overrides: Option<&StateOverrides>,
    ) -> SimulationResult {
        if overrides.is_some_and(|o| !o.is_empty()) {
            debug!("estimate-gas backend ignores state overrides");
        }

        match self.estimate(tx).await {
            Ok(gas) => SimulationResult::succeeded(gas.to_string()),
            Err(e) => {
                warn!("Estimate gas simulation failed: {}", e);
                SimulationResult::failed(e.to_string())
            }
        }
    }
}
