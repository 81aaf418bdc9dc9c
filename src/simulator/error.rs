//! Simulation error taxonomy
//!
//! Only `Configuration` and `Setup` ever escape a simulator: they come out of
//! `setup()`. Every other variant is folded into a failed `SimulationResult`
//! by the backend that hit it.

use std::time::Duration;

/// Errors raised while setting up or talking to a simulation backend.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Required configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote fork could not be created.
    #[error("fork setup failed: {0}")]
    Setup(String),

    /// HTTP transport failure talking to the simulation API.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON-RPC failure talking to a node.
    #[error("rpc error: {0}")]
    Rpc(#[from] alloy_transport::TransportError),

    /// A remote call did not finish in time.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    /// The simulation API answered with a non-success status.
    #[error("api returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The simulation API answered with a body we could not decode.
    #[error("malformed api response: {0}")]
    Decode(#[from] serde_json::Error),

    /// State override encoding failed.
    #[error("state override encoding failed: {0}")]
    Encoding(String),
}

impl SimulationError {
    /// Whether this error must halt the caller (as opposed to being reported
    /// inside a simulation result).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Setup(_))
    }
}

pub type Result<T, E = SimulationError> = std::result::Result<T, E>;
