//! Simulation Configuration
//!
//! Everything a simulator needs is read once, here, when it is constructed.
//! Values come from environment variables (with `.env` support) or from a
//! TOML file.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ============================================
// BACKEND KIND
// ============================================

/// Which simulation backend a `Simulator` drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Hosted Tenderly fork (supports overrides, replay URLs, chained state)
    Tenderly,

    /// Plain `eth_estimateGas` against an RPC node
    EstimateGas,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Tenderly
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Tenderly => write!(f, "tenderly"),
            BackendKind::EstimateGas => write!(f, "estimate-gas"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tenderly" | "fork" => Ok(BackendKind::Tenderly),
            "estimate-gas" | "estimate_gas" | "estimategas" => Ok(BackendKind::EstimateGas),
            other => Err(eyre::eyre!("unknown simulation backend: {}", other)),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Backend Selection ==========
    /// Backend used by `Simulator::from_config`
    pub backend: BackendKind,

    /// Network the simulations target (1 = Ethereum Mainnet)
    pub network_id: u64,

    /// RPC URL used by the estimate-gas backend
    pub rpc_url: String,

    // ========== Tenderly Credentials ==========
    /// Tenderly access key (KEEP SECRET!). Required by the fork backend.
    pub tenderly_token: Option<String>,

    /// Tenderly account slug
    pub tenderly_account_id: String,

    /// Tenderly project slug
    pub tenderly_project: String,

    // ========== Fork Reuse ==========
    /// Pre-existing fork to adopt instead of creating a new one
    pub tenderly_fork_id: Option<String>,

    /// Last simulation on `tenderly_fork_id`; mandatory when the fork id is set
    pub tenderly_fork_last_tx_id: Option<String>,

    /// Dedicated Tenderly test network RPC; transactions are sent for real
    pub tenderly_testnet_rpc: Option<String>,

    // ========== Endpoints ==========
    pub tenderly_api_url: String,
    pub tenderly_dashboard_url: String,

    // ========== Timeouts ==========
    /// Fork creation timeout
    pub fork_timeout_secs: u64,

    /// Fork simulation and override encoding timeout
    pub simulate_timeout_secs: u64,

    /// Timeout for plain JSON-RPC calls
    pub rpc_timeout_secs: u64,

    /// How long to wait for a test network transaction to be mined
    pub testnet_wait_timeout_secs: u64,

    /// Receipt polling interval on the test network
    pub testnet_poll_interval_ms: u64,

    // ========== Logging ==========
    /// Append every CLI simulation to `simulation_log_path`
    pub simulation_log: bool,

    pub simulation_log_path: String,
}

impl Config {
    pub const DEFAULT_TENDERLY_API_URL: &'static str = "https://api.tenderly.co/api/v1";
    pub const DEFAULT_TENDERLY_DASHBOARD_URL: &'static str = "https://dashboard.tenderly.co";

    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    /// Build a configuration from an arbitrary key lookup (the environment in
    /// production, a map in tests). Unset or unparseable values fall back to
    /// the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str, fallback: u64| {
            non_empty(key).and_then(|v| v.parse().ok()).unwrap_or(fallback)
        };

        Self {
            backend: non_empty("SIMULATION_BACKEND")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backend),
            network_id: non_empty("NETWORK_ID")
                .or_else(|| non_empty("CHAIN_ID"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.network_id),
            rpc_url: non_empty("RPC_URL").unwrap_or(defaults.rpc_url),

            tenderly_token: non_empty("TENDERLY_TOKEN"),
            tenderly_account_id: non_empty("TENDERLY_ACCOUNT_ID").unwrap_or_default(),
            tenderly_project: non_empty("TENDERLY_PROJECT").unwrap_or_default(),

            tenderly_fork_id: non_empty("TENDERLY_FORK_ID"),
            tenderly_fork_last_tx_id: non_empty("TENDERLY_FORK_LAST_TX_ID"),
            tenderly_testnet_rpc: non_empty("TENDERLY_TEST_NET_RPC"),

            tenderly_api_url: non_empty("TENDERLY_API_URL").unwrap_or(defaults.tenderly_api_url),
            tenderly_dashboard_url: non_empty("TENDERLY_DASHBOARD_URL")
                .unwrap_or(defaults.tenderly_dashboard_url),

            fork_timeout_secs: parsed("FORK_TIMEOUT_SECS", defaults.fork_timeout_secs),
            simulate_timeout_secs: parsed("SIMULATE_TIMEOUT_SECS", defaults.simulate_timeout_secs),
            rpc_timeout_secs: parsed("RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs),
            testnet_wait_timeout_secs: parsed(
                "TESTNET_WAIT_TIMEOUT_SECS",
                defaults.testnet_wait_timeout_secs,
            ),
            testnet_poll_interval_ms: parsed(
                "TESTNET_POLL_INTERVAL_MS",
                defaults.testnet_poll_interval_ms,
            ),

            simulation_log: non_empty("SIMULATION_LOG")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.simulation_log),
            simulation_log_path: non_empty("SIMULATION_LOG_PATH")
                .unwrap_or(defaults.simulation_log_path),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn fork_timeout(&self) -> Duration {
        Duration::from_secs(self.fork_timeout_secs)
    }

    pub fn simulate_timeout(&self) -> Duration {
        Duration::from_secs(self.simulate_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn testnet_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.testnet_wait_timeout_secs)
    }

    pub fn testnet_poll_interval(&self) -> Duration {
        Duration::from_millis(self.testnet_poll_interval_ms)
    }

    /// Validate the configuration for the selected backend.
    ///
    /// This is a pre-flight check for tooling; `setup()` performs the
    /// authoritative checks itself.
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            BackendKind::EstimateGas => {
                if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
                    return Err(eyre::eyre!("Invalid RPC_URL - please set a valid node URL"));
                }
            }
            BackendKind::Tenderly => {
                if self.tenderly_token.is_none() {
                    return Err(eyre::eyre!("Tenderly backend requires TENDERLY_TOKEN"));
                }
                if self.tenderly_account_id.is_empty() || self.tenderly_project.is_empty() {
                    return Err(eyre::eyre!(
                        "Tenderly backend requires TENDERLY_ACCOUNT_ID and TENDERLY_PROJECT"
                    ));
                }
                if self.tenderly_fork_id.is_some() && self.tenderly_fork_last_tx_id.is_none() {
                    return Err(eyre::eyre!(
                        "TENDERLY_FORK_ID is set but TENDERLY_FORK_LAST_TX_ID is not"
                    ));
                }
            }
        }

        if self.simulate_timeout_secs == 0 || self.fork_timeout_secs == 0 {
            return Err(eyre::eyre!("Timeouts must be at least one second"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let set = |v: bool| if v { "✓ Configured" } else { "✗ Not Set" };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              FORK-SIM - CONFIGURATION                      ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Backend:           {:^40} ║", self.backend);
        println!("║ Network ID:        {:^40} ║", self.network_id);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ TENDERLY                                                   ║");
        println!("║ • Access Key:      {:^40} ║", set(self.tenderly_token.is_some()));
        println!("║ • Account:         {:^40} ║", set(!self.tenderly_account_id.is_empty()));
        println!("║ • Project:         {:^40} ║", set(!self.tenderly_project.is_empty()));
        println!("║ • Fork ID:         {:^40} ║", set(self.tenderly_fork_id.is_some()));
        println!("║ • Last Tx ID:      {:^40} ║", set(self.tenderly_fork_last_tx_id.is_some()));
        println!("║ • Test Net RPC:    {:^40} ║", set(self.tenderly_testnet_rpc.is_some()));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ TIMEOUTS                                                   ║");
        println!("║ • Fork Creation:   {:>38}s ║", self.fork_timeout_secs);
        println!("║ • Simulation:      {:>38}s ║", self.simulate_timeout_secs);
        println!("║ • RPC:             {:>38}s ║", self.rpc_timeout_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ • Simulation Log:  {:^40} ║",
            if self.simulation_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Tenderly,
            network_id: 1,
            rpc_url: "https://eth.llamarpc.com".to_string(),
            tenderly_token: None,
            tenderly_account_id: String::new(),
            tenderly_project: String::new(),
            tenderly_fork_id: None,
            tenderly_fork_last_tx_id: None,
            tenderly_testnet_rpc: None,
            tenderly_api_url: Self::DEFAULT_TENDERLY_API_URL.to_string(),
            tenderly_dashboard_url: Self::DEFAULT_TENDERLY_DASHBOARD_URL.to_string(),
            fork_timeout_secs: 20,
            simulate_timeout_secs: 30,
            rpc_timeout_secs: 30,
            testnet_wait_timeout_secs: 60,
            testnet_poll_interval_ms: 1000,
            simulation_log: false,
            simulation_log_path: "./logs/simulations.log".to_string(),
        }
    }
}

// ============================================
// SIMULATION LOGGER
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

use crate::simulator::{SimulationResult, TxParams};

/// One simulate call, as written to the simulation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub timestamp: DateTime<Utc>,
    pub backend: String,
    pub fork_id: Option<String>,
    pub tx: TxParams,
    pub result: SimulationResult,
}

impl SimulationRecord {
    pub fn new(
        backend: impl Into<String>,
        fork_id: Option<String>,
        tx: TxParams,
        result: SimulationResult,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            backend: backend.into(),
            fork_id,
            tx,
            result,
        }
    }

    /// Append this record to a file as one JSON line
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================
