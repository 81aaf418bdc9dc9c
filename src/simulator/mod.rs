//! The Simulator
//!
//! Responsible for:
//! - Selecting and owning one simulation backend (Tenderly fork or eth_estimateGas)
//! - Setting the backend up exactly once
//! - Running simulations and normalizing every outcome into a `SimulationResult`
//!
//! Calls against one `Simulator` are sequential by construction (`&mut self`):
//! each fork simulation reads the tip and may move it, so two in flight on the
//! same lineage would both build on the same stale root.

mod api;
mod encoder;
mod error;
mod estimate_gas;
mod tenderly;
mod testnet;
mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::TenderlyApi;
pub use encoder::OverrideEncoder;
pub use error::{Result, SimulationError};
pub use estimate_gas::EstimateGasBackend;
pub use tenderly::{resolve_fork_source, ForkBinding, ForkSource, TenderlyBackend, FORK_GAS_LIMIT};
pub use testnet::{TestnetRpc, TESTNET_GAS_LIMIT};
pub use types::{
    EncodedOverrides, ForkState, SimulationResult, SimulationStep, StateObject, StateOverrides,
    TxParams,
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, Config};

/// One way of running a simulation
#[async_trait]
pub trait SimulationBackend: Send + Sync {
    /// Short backend name for logs and records
    fn name(&self) -> &'static str;

    /// Whether state overrides passed to `simulate` take effect
    fn supports_overrides(&self) -> bool;

    /// Current fork lineage, for backends that have one
    fn fork_state(&self) -> Option<&ForkState> {
        None
    }

    /// Establish any remote session. Idempotent.
    async fn setup(&mut self) -> Result<()>;

    /// Run one simulation. Never fails: transport problems and reverts are
    /// reported inside the result.
    async fn simulate(
        &mut self,
        tx: &TxParams,
        overrides: Option<&StateOverrides>,
    ) -> SimulationResult;
}

/// Façade over one backend
pub struct Simulator {
    backend: Box<dyn SimulationBackend>,
    ready: bool,
}

impl Simulator {
    pub fn new(backend: impl SimulationBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            ready: false,
        }
    }

    /// Build the backend selected by `config.backend`
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.backend {
            BackendKind::Tenderly => Ok(Self::tenderly(config, None)),
            BackendKind::EstimateGas => Ok(Self::new(EstimateGasBackend::new(
                &config.rpc_url,
                config.rpc_timeout(),
            )?)),
        }
    }

    /// Tenderly simulator, optionally continuing an existing fork lineage
    pub fn tenderly(config: &Config, fork: Option<ForkState>) -> Self {
        match fork {
            Some(state) => Self::new(TenderlyBackend::with_fork(config, state)),
            None => Self::new(TenderlyBackend::new(config)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn supports_overrides(&self) -> bool {
        self.backend.supports_overrides()
    }

    pub fn fork_state(&self) -> Option<&ForkState> {
        self.backend.fork_state()
    }

    pub fn fork_id(&self) -> Option<&str> {
        self.fork_state().map(|state| state.fork_id.as_str())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Set the backend up. Runs once; later calls return immediately.
    pub async fn setup(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        self.backend.setup().await?;
        self.ready = true;

        match self.fork_state() {
            Some(state) => info!(
                "{} simulator ready on fork {} at {}",
                self.backend_name(),
                state.fork_id,
                state.tip
            ),
            None => info!("{} simulator ready", self.backend_name()),
        }
        Ok(())
    }

    pub async fn simulate(
        &mut self,
        tx: &TxParams,
        overrides: Option<&StateOverrides>,
    ) -> SimulationResult {
        self.backend.simulate(tx, overrides).await
    }

    /// Run `steps` in order, each building on the state left by the previous
    /// successful one, and collect every result.
    pub async fn simulate_all(&mut self, steps: &[SimulationStep]) -> Vec<SimulationResult> {
        let mut results = Vec::with_capacity(steps.len());

        for (i, step) in steps.iter().enumerate() {
            let result = self.simulate(&step.tx, step.overrides.as_ref()).await;
            if result.success {
                debug!("Step {} succeeded (gas {:?})", i, result.gas_used);
            } else {
                warn!("Step {} failed: {:?}", i, result.error);
            }
            results.push(result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Address, Bytes};
    use mockito::Matcher;
    use serde_json::json;

    const ALICE: Address = address!("000000000000000000000000000000000000000a");
    const BOB: Address = address!("000000000000000000000000000000000000000b");

    fn config(api_url: &str) -> Config {
        Config {
            tenderly_token: Some("secret".into()),
            tenderly_account_id: "acme".into(),
            tenderly_project: "sims".into(),
            tenderly_api_url: api_url.to_string(),
            ..Default::default()
        }
    }

    fn transfer() -> TxParams {
        TxParams::new(ALICE, BOB, Bytes::new())
    }

    /// Counts calls so the façade's memoization can be observed
    struct CountingBackend {
        setups: usize,
        fail_setup: bool,
    }

    #[async_trait]
    impl SimulationBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn supports_overrides(&self) -> bool {
            false
        }

        async fn setup(&mut self) -> Result<()> {
            self.setups += 1;
            if self.fail_setup {
                return Err(SimulationError::Setup("no fork for you".into()));
            }
            Ok(())
        }

        async fn simulate(&mut self, _: &TxParams, _: Option<&StateOverrides>) -> SimulationResult {
            SimulationResult::succeeded(self.setups.to_string())
        }
    }

    #[tokio::test]
    async fn test_setup_is_memoized() {
        let mut simulator = Simulator::new(CountingBackend { setups: 0, fail_setup: false });
        assert!(!simulator.is_ready());

        simulator.setup().await.unwrap();
        simulator.setup().await.unwrap();

        assert!(simulator.is_ready());
        // The backend reports how many times it was set up
        let result = simulator.simulate(&transfer(), None).await;
        assert_eq!(result.gas_used.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_failed_setup_is_surfaced_and_not_memoized() {
        let mut simulator = Simulator::new(CountingBackend { setups: 0, fail_setup: true });

        let err = simulator.setup().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!simulator.is_ready());
        assert!(simulator.setup().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_token_fails_setup() {
        let mut simulator = Simulator::tenderly(&Config::default(), None);
        let err = simulator.setup().await.unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
    }

    #[test]
    fn test_from_config_picks_backend() {
        let config = Config {
            backend: BackendKind::EstimateGas,
            rpc_url: "http://localhost:8545".into(),
            ..Default::default()
        };
        let simulator = Simulator::from_config(&config).unwrap();
        assert_eq!(simulator.backend_name(), "estimate-gas");
        assert!(simulator.fork_id().is_none());

        let simulator = Simulator::from_config(&Config::default()).unwrap();
        assert_eq!(simulator.backend_name(), "tenderly");
        assert!(simulator.supports_overrides());
    }

    /// Success on fork f1 moves the tip from t0 to t1; a revert right after
    /// leaves it on t1.
    #[tokio::test]
    async fn test_fork_lineage_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/account/acme/project/sims/fork/f1/simulate")
            .match_body(Matcher::PartialJson(json!({ "root": "t0", "value": "0", "input": "0x" })))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "simulation": { "id": "t1" },
                    "transaction": { "status": true, "gas_used": "21000" }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/account/acme/project/sims/fork/f1/simulate")
            .match_body(Matcher::PartialJson(json!({ "root": "t1" })))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "simulation": { "id": "t2" },
                    "transaction": {
                        "status": false,
                        "error_info": { "error_message": "revert", "address": "0xB" }
                    }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let mut simulator =
            Simulator::tenderly(&config(&server.url()), Some(ForkState::new("f1", "t0")));
        simulator.setup().await.unwrap();
        assert_eq!(simulator.fork_id(), Some("f1"));

        let ok = simulator.simulate(&transfer(), None).await;
        assert!(ok.success);
        assert_eq!(ok.gas_used.as_deref(), Some("21000"));
        assert!(ok.error.is_none());
        assert_eq!(simulator.fork_state().unwrap().tip, "t1");

        let reverted = simulator.simulate(&transfer(), None).await;
        assert!(!reverted.success);
        assert_eq!(reverted.error.as_deref(), Some("Simulation failed: revert at 0xB"));
        assert!(reverted.replay_url.unwrap().ends_with("/fork/f1/simulation/t2"));
        assert_eq!(simulator.fork_state().unwrap().tip, "t1");

        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_simulate_all_collects_every_result() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("POST", "/account/acme/project/sims/fork/f1/simulate")
            .match_body(Matcher::PartialJson(json!({ "root": "t0" })))
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "simulation": { "id": "t1" }, "transaction": { "status": true, "gas_used": 50000 } })
                    .to_string(),
            )
            .create_async()
            .await;
        let _down = server
            .mock("POST", "/account/acme/project/sims/fork/f1/simulate")
            .match_body(Matcher::PartialJson(json!({ "root": "t1" })))
            .with_status(500)
            .create_async()
            .await;

        let steps = vec![
            SimulationStep::new(transfer()),
            SimulationStep::new(transfer()),
        ];
        let mut simulator =
            Simulator::tenderly(&config(&server.url()), Some(ForkState::new("f1", "t0")));
        let results = simulator.simulate_all(&steps).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.is_some());
        assert_eq!(simulator.fork_state().unwrap().tip, "t1");
    }
}
