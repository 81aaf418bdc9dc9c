//! Tenderly fork backend
//!
//! Simulations run on a persistent Tenderly fork. Each one is applied on top
//! of the previous successful simulation (the fork's tip), giving a single
//! ordered lineage of hypothetical states per backend instance.
//!
//! Fork resolution order during `setup()`:
//! 1. fork id + tip passed at construction
//! 2. `TENDERLY_FORK_ID` / `TENDERLY_FORK_LAST_TX_ID` from the configuration
//! 3. a dedicated test network (`TENDERLY_TEST_NET_RPC`)
//! 4. a freshly created fork

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::api::{ForkSimulationRequest, ForkTransaction, TenderlyApi};
use super::encoder::OverrideEncoder;
use super::error::{Result, SimulationError};
use super::testnet::TestnetRpc;
use super::types::{EncodedOverrides, ForkState, SimulationResult, StateOverrides, TxParams};
use super::SimulationBackend;
use crate::config::Config;

/// Gas ceiling offered to every fork simulation (80,000,000).
/// Simulations are unconstrained probes, not gas-accurate replays.
pub const FORK_GAS_LIMIT: u64 = 80_000_000;

// ============================================
// FORK RESOLUTION
// ============================================

/// Where the lineage for a backend comes from, decided before any remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkSource {
    /// Fork id + tip supplied by the caller
    Explicit(ForkState),
    /// Fork id + tip from the configuration
    Environment(ForkState),
    /// Dedicated test network URL
    Testnet(String),
    /// Nothing to reuse; a new fork must be created
    Create,
}

/// A resolved lineage
#[derive(Debug, Clone)]
pub enum ForkBinding {
    /// Reusing an existing fork
    Adopted(ForkState),
    /// Sending real transactions to a test network
    Bound(TestnetRpc),
    /// Fork created by this backend
    Created(ForkState),
}

impl ForkBinding {
    pub fn fork_state(&self) -> Option<&ForkState> {
        match self {
            ForkBinding::Adopted(state) | ForkBinding::Created(state) => Some(state),
            ForkBinding::Bound(_) => None,
        }
    }
}

/// Decide where the fork comes from. Requires the access key first, whatever
/// the outcome, so a misconfigured simulator never looks ready.
pub fn resolve_fork_source(explicit: Option<&ForkState>, config: &Config) -> Result<ForkSource> {
    if config.tenderly_token.is_none() {
        return Err(SimulationError::Configuration(
            "TENDERLY_TOKEN not found in the env".to_string(),
        ));
    }

    if let Some(state) = explicit {
        return Ok(ForkSource::Explicit(state.clone()));
    }

    if let Some(fork_id) = &config.tenderly_fork_id {
        let tip = config.tenderly_fork_last_tx_id.as_ref().ok_or_else(|| {
            SimulationError::Configuration(
                "TENDERLY_FORK_ID is set, TENDERLY_FORK_LAST_TX_ID must be set too".to_string(),
            )
        })?;
        return Ok(ForkSource::Environment(ForkState::new(fork_id, tip)));
    }

    if let Some(url) = &config.tenderly_testnet_rpc {
        return Ok(ForkSource::Testnet(url.clone()));
    }

    Ok(ForkSource::Create)
}

// ============================================
// BACKEND
// ============================================

pub struct TenderlyBackend {
    config: Config,
    api: TenderlyApi,
    encoder: OverrideEncoder,
    binding: Option<ForkBinding>,
}

impl TenderlyBackend {
    /// Backend that resolves its fork during `setup()`
    pub fn new(config: &Config) -> Self {
        let api = TenderlyApi::new(config);
        Self {
            encoder: OverrideEncoder::new(api.clone(), config.network_id),
            api,
            config: config.clone(),
            binding: None,
        }
    }

    /// Backend bound to an existing fork lineage. `setup()` will not issue
    /// any remote call; the first simulation is rooted at `state.tip`.
    pub fn with_fork(config: &Config, state: ForkState) -> Self {
        let mut backend = Self::new(config);
        backend.binding = Some(ForkBinding::Adopted(state));
        backend
    }

    pub fn binding(&self) -> Option<&ForkBinding> {
        self.binding.as_ref()
    }

    async fn bind(&self, source: ForkSource) -> Result<ForkBinding> {
        match source {
            ForkSource::Explicit(state) | ForkSource::Environment(state) => {
                info!("Adopting Tenderly fork {} at {}", state.fork_id, state.tip);
                Ok(ForkBinding::Adopted(state))
            }
            ForkSource::Testnet(url) => {
                info!("Binding to Tenderly test network {}", url);
                let testnet = TestnetRpc::connect(
                    &url,
                    self.config.testnet_poll_interval(),
                    self.config.testnet_wait_timeout(),
                )?;
                Ok(ForkBinding::Bound(testnet))
            }
            ForkSource::Create => {
                let created = self
                    .api
                    .create_fork(self.config.network_id)
                    .await
                    .map_err(|e| match e {
                        SimulationError::Configuration(_) => e,
                        other => SimulationError::Setup(other.to_string()),
                    })?;

                let state = ForkState::new(created.simulation_fork.id, created.root_transaction.id);
                info!(
                    "Created Tenderly fork {} of network {} (root {})",
                    state.fork_id, self.config.network_id, state.tip
                );
                Ok(ForkBinding::Created(state))
            }
        }
    }
}

/// One simulation on `state`'s fork. The tip only moves if the simulated
/// transaction succeeded.
async fn simulate_on_fork(
    api: &TenderlyApi,
    encoder: &OverrideEncoder,
    state: &mut ForkState,
    tx: &TxParams,
    overrides: Option<&StateOverrides>,
) -> Result<SimulationResult> {
    let state_objects = match overrides {
        Some(overrides) if !overrides.is_empty() => encoder.encode(overrides).await?,
        _ => EncodedOverrides::default(),
    };

    let request = ForkSimulationRequest {
        from: tx.from,
        to: tx.to,
        save: true,
        root: &state.tip,
        value: tx.value_or_zero().to_string(),
        gas: FORK_GAS_LIMIT,
        input: &tx.data,
        state_objects: &state_objects,
    };
    debug!("Simulating {} -> {} on fork {} at {}", tx.from, tx.to, state.fork_id, state.tip);

    let response = api.simulate_on_fork(&state.fork_id, &request).await?;
    let outcome: ForkTransaction = serde_json::from_value(response.transaction.clone())?;
    let simulation_id = response.simulation.id;
    let replay_url = api.replay_url(&state.fork_id, &simulation_id);

    if outcome.status {
        state.advance(simulation_id);
        Ok(SimulationResult::succeeded(outcome.gas_used.unwrap_or_else(|| "0".to_string()))
            .with_replay_url(replay_url)
            .with_transaction(response.transaction))
    } else {
        let error = match outcome.error_info {
            Some(info) => info.describe(),
            None => "Simulation failed: execution reverted".to_string(),
        };
        warn!("{} ({})", error, replay_url);
        Ok(SimulationResult::failed(error).with_replay_url(replay_url))
    }
}

#[async_trait]
impl SimulationBackend for TenderlyBackend {
    fn name(&self) -> &'static str {
        "tenderly"
    }

    fn supports_overrides(&self) -> bool {
        !matches!(self.binding, Some(ForkBinding::Bound(_)))
    }

    fn fork_state(&self) -> Option<&ForkState> {
        self.binding.as_ref().and_then(ForkBinding::fork_state)
    }

    async fn setup(&mut self) -> Result<()> {
        let explicit = self.fork_state().cloned();
        let source = resolve_fork_source(explicit.as_ref(), &self.config)?;

        if self.binding.is_some() {
            return Ok(());
        }

        let binding = self.bind(source).await?;
        self.binding = Some(binding);
        Ok(())
    }

    async fn simulate(
        &mut self,
        tx: &TxParams,
        overrides: Option<&StateOverrides>,
    ) -> SimulationResult {
        match self.binding.as_mut() {
            None => SimulationResult::failed("Tenderly fork is not set up; call setup() first"),
            Some(ForkBinding::Bound(testnet)) => {
                if overrides.is_some_and(|o| !o.is_empty()) {
                    debug!("State overrides ignored on test network {}", testnet.url());
                }
                testnet.execute(tx).await
            }
            Some(ForkBinding::Adopted(state) | ForkBinding::Created(state)) => {
                match simulate_on_fork(&self.api, &self.encoder, state, tx, overrides).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Tenderly simulation failed: {}", e);
                        SimulationResult::failed(e.to_string())
                    }
                }
            }
        }
    }
}
