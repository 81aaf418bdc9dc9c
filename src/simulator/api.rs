//! Tenderly REST client
//!
//! Thin wrapper over the three endpoints the simulator uses: fork creation,
//! simulation on a fork and state-override encoding. All requests carry the
//! `x-access-key` header and a per-request timeout.

use alloy_primitives::{Address, Bytes};
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::error::{Result, SimulationError};
use super::types::EncodedOverrides;
use crate::config::Config;

// ============================================
// REQUEST TYPES
// ============================================

/// Body of `POST .../fork/{id}/simulate`
#[derive(Debug, Clone, Serialize)]
pub struct ForkSimulationRequest<'a> {
    pub from: Address,
    pub to: Address,
    pub save: bool,
    /// Simulation the new one is applied on top of
    pub root: &'a str,
    /// Wei, decimal
    pub value: String,
    pub gas: u64,
    pub input: &'a Bytes,
    pub state_objects: &'a EncodedOverrides,
}

#[derive(Debug, Serialize)]
struct EncodeStatesRequest<'a> {
    #[serde(rename = "networkID")]
    network_id: String,
    #[serde(rename = "stateOverrides")]
    state_overrides: BTreeMap<&'a Address, ContractValues<'a>>,
}

#[derive(Debug, Serialize)]
struct ContractValues<'a> {
    value: &'a BTreeMap<String, String>,
}

// ============================================
// RESPONSE TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    pub id: String,
}

/// Response of `POST .../fork`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateForkResponse {
    pub simulation_fork: IdRef,
    pub root_transaction: IdRef,
}

/// Response of `POST .../fork/{id}/simulate`.
///
/// `transaction` is kept raw so it can be handed back to callers untouched;
/// `ForkTransaction` is the typed view of the fields we act on.
#[derive(Debug, Clone, Deserialize)]
pub struct ForkSimulationResponse {
    pub simulation: IdRef,
    pub transaction: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForkTransaction {
    #[serde(default)]
    pub status: bool,
    #[serde(default, deserialize_with = "gas_as_string")]
    pub gas_used: Option<String>,
    #[serde(default)]
    pub error_info: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub error_message: Option<String>,
    /// Null when the revert has no attributable contract
    #[serde(default)]
    pub address: Option<String>,
}

impl ErrorInfo {
    /// "Simulation failed: <message> at <address>"
    pub fn describe(&self) -> String {
        format!(
            "Simulation failed: {} at {}",
            self.error_message.as_deref().unwrap_or("execution reverted"),
            self.address.as_deref().unwrap_or("unknown")
        )
    }
}

#[derive(Debug, Deserialize)]
struct EncodeStatesResponse {
    #[serde(rename = "stateOverrides")]
    state_overrides: BTreeMap<Address, EncodedContract>,
}

#[derive(Debug, Deserialize)]
struct EncodedContract {
    value: BTreeMap<String, String>,
}

/// Tenderly reports gas as a number, older fixtures as a string
fn gas_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

// ============================================
// CLIENT
// ============================================

#[derive(Debug, Clone, Copy)]
pub struct ApiTimeouts {
    pub fork: Duration,
    pub simulate: Duration,
}

/// Client for one Tenderly account/project
#[derive(Debug, Clone)]
pub struct TenderlyApi {
    http_client: Client,
    api_url: String,
    dashboard_url: String,
    account_id: String,
    project: String,
    access_key: Option<String>,
    timeouts: ApiTimeouts,
}

impl TenderlyApi {
    pub fn new(config: &Config) -> Self {
        Self {
            http_client: Client::new(),
            api_url: config.tenderly_api_url.trim_end_matches('/').to_string(),
            dashboard_url: config.tenderly_dashboard_url.trim_end_matches('/').to_string(),
            account_id: config.tenderly_account_id.clone(),
            project: config.tenderly_project.clone(),
            access_key: config.tenderly_token.clone(),
            timeouts: ApiTimeouts {
                fork: config.fork_timeout(),
                simulate: config.simulate_timeout(),
            },
        }
    }

    pub fn has_access_key(&self) -> bool {
        self.access_key.is_some()
    }

    fn access_key(&self) -> Result<&str> {
        self.access_key.as_deref().ok_or_else(|| {
            SimulationError::Configuration("TENDERLY_TOKEN not found in the env".to_string())
        })
    }

    fn project_url(&self, path: &str) -> String {
        format!(
            "{}/account/{}/project/{}/{}",
            self.api_url, self.account_id, self.project, path
        )
    }

    /// Dashboard link for one simulation on a fork
    pub fn replay_url(&self, fork_id: &str, simulation_id: &str) -> String {
        format!(
            "{}/{}/{}/fork/{}/simulation/{}",
            self.dashboard_url, self.account_id, self.project, fork_id, simulation_id
        )
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Response> {
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(url)
            .header("x-access-key", self.access_key()?)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SimulationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Create a fork of `network_id` at its latest block
    pub async fn create_fork(&self, network_id: u64) -> Result<CreateForkResponse> {
        let url = self.project_url("fork");
        let body = json!({ "network_id": network_id.to_string() });

        let response = self.post(&url, &body, self.timeouts.fork).await?;
        Ok(response.json().await?)
    }

    /// Run one simulation on an existing fork
    pub async fn simulate_on_fork(
        &self,
        fork_id: &str,
        request: &ForkSimulationRequest<'_>,
    ) -> Result<ForkSimulationResponse> {
        let url = self.project_url(&format!("fork/{}/simulate", fork_id));

        let response = self.post(&url, request, self.timeouts.simulate).await?;
        Ok(response.json().await?)
    }

    /// Resolve symbolic storage assignments into raw slots
    pub async fn encode_states(
        &self,
        network_id: u64,
        overrides: &super::types::StateOverrides,
    ) -> Result<EncodedOverrides> {
        let url = self.project_url("contracts/encode-states");
        let body = EncodeStatesRequest {
            network_id: network_id.to_string(),
            state_overrides: overrides
                .contracts()
                .map(|(contract, value)| (contract, ContractValues { value }))
                .collect(),
        };

        let response = self.post(&url, &body, self.timeouts.simulate).await?;
        let decoded: EncodeStatesResponse = response.json().await?;

        Ok(decoded
            .state_overrides
            .into_iter()
            .map(|(contract, encoded)| (contract, encoded.value))
            .collect())
    }
}
