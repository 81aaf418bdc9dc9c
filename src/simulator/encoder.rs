//! State override encoding
//!
//! Turns symbolic storage assignments into the raw slot layout the fork
//! simulation endpoint accepts. Stateless: one remote call per `encode`.

use tracing::debug;

use super::api::TenderlyApi;
use super::error::{Result, SimulationError};
use super::types::{EncodedOverrides, StateOverrides};

pub struct OverrideEncoder {
    api: TenderlyApi,
    network_id: u64,
}

impl OverrideEncoder {
    pub fn new(api: TenderlyApi, network_id: u64) -> Self {
        Self { api, network_id }
    }

    /// Encode `overrides`. Any transport, status or decoding problem is
    /// reported as `SimulationError::Encoding`.
    pub async fn encode(&self, overrides: &StateOverrides) -> Result<EncodedOverrides> {
        if overrides.is_empty() {
            return Ok(EncodedOverrides::default());
        }

        let encoded = self
            .api
            .encode_states(self.network_id, overrides)
            .await
            .map_err(|e| match e {
                SimulationError::Configuration(_) => e,
                other => SimulationError::Encoding(other.to_string()),
            })?;

        debug!("Encoded state overrides for {} contract(s)", encoded.len());
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use alloy_primitives::{address, Address};
    use mockito::Matcher;
    use serde_json::json;

    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    fn encoder(url: &str) -> OverrideEncoder {
        let config = Config {
            tenderly_token: Some("secret".into()),
            tenderly_account_id: "acme".into(),
            tenderly_project: "sims".into(),
            tenderly_api_url: url.to_string(),
            network_id: 1,
            ..Default::default()
        };
        OverrideEncoder::new(TenderlyApi::new(&config), config.network_id)
    }

    #[tokio::test]
    async fn test_encode_sends_network_and_symbolic_values() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/account/acme/project/sims/contracts/encode-states")
            .match_header("x-access-key", "secret")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({ "networkID": "1" })),
                Matcher::Regex(
                    r#""value":\{"_balances\[0x0000000000000000000000000000000000000001\]":"1000"\}"#
                        .to_string(),
                ),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "stateOverrides": {
                        "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48": {
                            "value": { "0xabc": "0x00000000000000000000000000000000000000000000000000000000000003e8" }
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let overrides = StateOverrides::new().with_slot(
            USDC,
            "_balances[0x0000000000000000000000000000000000000001]",
            "1000",
        );
        let encoded = encoder(&server.url()).encode(&overrides).await.unwrap();

        let storage = &encoded.get(&USDC).unwrap().storage;
        assert_eq!(storage.len(), 1);
        assert!(storage["0xabc"].ends_with("03e8"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_overrides_skip_remote_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let encoded = encoder(&server.url()).encode(&StateOverrides::new()).await.unwrap();
        assert!(encoded.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_failure_is_encoding_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/account/acme/project/sims/contracts/encode-states")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let overrides = StateOverrides::new().with_slot(USDC, "totalSupply", "1");
        let err = encoder(&server.url()).encode(&overrides).await.unwrap_err();
        assert!(matches!(err, SimulationError::Encoding(_)));
        assert!(err.to_string().contains("500"));
    }
}
