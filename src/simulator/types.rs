//! Shared simulation types
//!
//! Call-scoped inputs (`TxParams`, `StateOverrides`), the backend-native
//! override encoding, the per-backend fork lineage and the normalized result.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// TRANSACTION
// ============================================

/// A candidate transaction to simulate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    pub from: Address,
    pub to: Address,

    /// Wei attached to the call; absent means zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,

    /// Calldata
    #[serde(default)]
    pub data: Bytes,
}

impl TxParams {
    pub fn new(from: Address, to: Address, data: Bytes) -> Self {
        Self { from, to, value: None, data }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn value_or_zero(&self) -> U256 {
        self.value.unwrap_or(U256::ZERO)
    }
}

/// One entry of a batch: a transaction and the overrides to run it with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStep {
    #[serde(flatten)]
    pub tx: TxParams,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<StateOverrides>,
}

impl SimulationStep {
    pub fn new(tx: TxParams) -> Self {
        Self { tx, overrides: None }
    }

    pub fn with_overrides(mut self, overrides: StateOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

// ============================================
// STATE OVERRIDES
// ============================================

/// Symbolic per-contract storage assignments, e.g.
/// `"_balances[0xabc..]" -> "1000"`, applied for one simulation only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateOverrides(BTreeMap<Address, BTreeMap<String, String>>);

impl StateOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style slot assignment
    pub fn with_slot(
        mut self,
        contract: Address,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(contract, key, value);
        self
    }

    pub fn insert(&mut self, contract: Address, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(contract).or_default().insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    pub fn contracts(&self) -> impl Iterator<Item = (&Address, &BTreeMap<String, String>)> {
        self.0.iter()
    }
}

/// Storage for one contract in the simulation API's native layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateObject {
    pub storage: BTreeMap<String, String>,
}

/// Overrides after encoding: contract -> hashed slot -> packed value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedOverrides(BTreeMap<Address, StateObject>);

impl EncodedOverrides {
    pub fn insert(&mut self, contract: Address, storage: BTreeMap<String, String>) {
        self.0.insert(contract, StateObject { storage });
    }

    pub fn get(&self, contract: &Address) -> Option<&StateObject> {
        self.0.get(contract)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Address, BTreeMap<String, String>)> for EncodedOverrides {
    fn from_iter<I: IntoIterator<Item = (Address, BTreeMap<String, String>)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(contract, storage)| (contract, StateObject { storage }))
                .collect(),
        )
    }
}

// ============================================
// FORK LINEAGE
// ============================================

/// A remote fork and the last simulation accepted on it.
///
/// Every simulation is applied on top of `tip`. The tip only moves when a
/// simulation succeeds, so a failed call can be retried from the same root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkState {
    pub fork_id: String,
    pub tip: String,
}

impl ForkState {
    pub fn new(fork_id: impl Into<String>, tip: impl Into<String>) -> Self {
        Self {
            fork_id: fork_id.into(),
            tip: tip.into(),
        }
    }

    pub(crate) fn advance(&mut self, simulation_id: String) {
        self.tip = simulation_id;
    }
}

// ============================================
// RESULT
// ============================================

/// Normalized outcome of one simulation.
///
/// `success == false` with `error == None` is a revert without diagnostics.
/// With `error` set it is either a revert diagnostic ("Simulation failed: ..")
/// or a transport failure; callers must look at `error`, not only `success`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_url: Option<String>,

    /// Raw backend transaction object, opaque to this crate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimulationResult {
    pub fn succeeded(gas_used: impl Into<String>) -> Self {
        Self {
            success: true,
            gas_used: Some(gas_used.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_replay_url(mut self, url: impl Into<String>) -> Self {
        self.replay_url = Some(url.into());
        self
    }

    pub fn with_transaction(mut self, transaction: serde_json::Value) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Gas used as an integer, if the backend reported a parseable amount
    pub fn gas_used_u64(&self) -> Option<u64> {
        self.gas_used.as_deref().and_then(|g| g.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const TOKEN: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    #[test]
    fn test_value_defaults_to_zero() {
        let tx = TxParams::new(Address::ZERO, TOKEN, Bytes::new());
        assert_eq!(tx.value_or_zero(), U256::ZERO);
        assert_eq!(tx.with_value(U256::from(7)).value_or_zero(), U256::from(7));
    }

    #[test]
    fn test_tx_params_from_json_without_value() {
        let tx: TxParams = serde_json::from_str(
            r#"{"from":"0x0000000000000000000000000000000000000001","to":"0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48","data":"0x095ea7b3"}"#,
        )
        .unwrap();
        assert_eq!(tx.to, TOKEN);
        assert_eq!(tx.value, None);
        assert_eq!(tx.data.len(), 4);
    }

    #[test]
    fn test_batch_step_from_json() {
        let steps: Vec<SimulationStep> = serde_json::from_str(
            r#"[
                {"from":"0x0000000000000000000000000000000000000001","to":"0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"},
                {"from":"0x0000000000000000000000000000000000000001","to":"0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                 "overrides":{"0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48":{"_balances[0x01]":"5"}}}
            ]"#,
        )
        .unwrap();

        assert_eq!(steps.len(), 2);
        assert!(steps[0].overrides.is_none());
        assert!(steps[0].tx.data.is_empty());
        let overrides = steps[1].overrides.as_ref().unwrap();
        assert_eq!(overrides.contracts().next().unwrap().0, &TOKEN);
    }

    #[test]
    fn test_empty_overrides() {
        assert!(StateOverrides::new().is_empty());
        let overrides = StateOverrides::new().with_slot(TOKEN, "_balances[0x01]", "1000");
        assert!(!overrides.is_empty());
        assert_eq!(overrides.contracts().count(), 1);
    }

    #[test]
    fn test_result_serializes_camel_case_and_skips_empty() {
        let result = SimulationResult::succeeded("21000").with_replay_url("https://x/1");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": true, "gasUsed": "21000", "replayUrl": "https://x/1"})
        );
        assert_eq!(result.gas_used_u64(), Some(21000));
    }

    #[test]
    fn test_encoded_overrides_state_objects_shape() {
        let mut storage = BTreeMap::new();
        storage.insert("0x01".to_string(), "0x02".to_string());
        let encoded: EncodedOverrides = [(TOKEN, storage)].into_iter().collect();

        let json = serde_json::to_value(&encoded).unwrap();
        let entry = json
            .as_object()
            .and_then(|m| m.values().next())
            .cloned()
            .unwrap();
        assert_eq!(entry, serde_json::json!({"storage": {"0x01": "0x02"}}));
    }

    #[test]
    fn test_fork_state_advance() {
        let mut state = ForkState::new("f1", "t0");
        state.advance("t1".into());
        assert_eq!(state, ForkState::new("f1", "t1"));
    }
}
