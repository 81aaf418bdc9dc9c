//! fork-sim - simulate transactions before sending them
//!
//! Run with: cargo run -- simulate --from 0x.. --to 0x.. --data 0x..
//!
//! Backends:
//! - tenderly:     hosted fork, chained state, replay links, state overrides
//! - estimate-gas: eth_estimateGas against RPC_URL

use alloy_primitives::{Address, Bytes, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fork_sim::{
    BackendKind, Config, ForkState, SimulationRecord, SimulationResult, SimulationStep, Simulator,
    StateOverrides, TxParams,
};

#[derive(Debug, Parser)]
#[command(name = "fork-sim", version, about = "Simulate transactions on a Tenderly fork or via eth_estimateGas")]
struct Cli {
    /// TOML configuration file (defaults to environment / .env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend override: tenderly | estimate-gas
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Continue an existing fork instead of resolving one
    #[arg(long, global = true, requires = "tip")]
    fork_id: Option<String>,

    /// Last accepted simulation on --fork-id
    #[arg(long, global = true, requires = "fork_id")]
    tip: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Simulate a single transaction
    Simulate {
        #[arg(long)]
        from: Address,

        #[arg(long)]
        to: Address,

        /// Wei to attach
        #[arg(long)]
        value: Option<U256>,

        /// Hex calldata
        #[arg(long, default_value = "0x")]
        data: String,

        /// JSON file with state overrides: { "<contract>": { "<slot expr>": "<value>" } }
        #[arg(long)]
        overrides: Option<PathBuf>,
    },

    /// Simulate a JSON array of transactions in order on one lineage
    Batch {
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

fn print_banner(config: &Config) {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(format!(" 🔬 FORK-SIM - Transaction Simulator ({})", config.backend)).cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_result(index: Option<usize>, result: &SimulationResult) {
    let label = index.map(|i| format!("#{} ", i)).unwrap_or_default();

    if result.success {
        println!(
            "{} {}gas used: {}",
            style("✓ SUCCESS").green().bold(),
            label,
            result.gas_used.as_deref().unwrap_or("?")
        );
    } else {
        println!("{} {}", style("✗ FAILED").red().bold(), label);
    }
    if let Some(error) = &result.error {
        println!("   error:  {}", style(error).red());
    }
    if let Some(url) = &result.replay_url {
        println!("   replay: {}", style(url).underlined());
    }
}

fn parse_calldata(data: &str) -> Result<Bytes> {
    let raw = hex::decode(data.trim_start_matches("0x"))
        .map_err(|e| eyre!("invalid calldata {}: {}", data, e))?;
    Ok(Bytes::from(raw))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(backend) = &cli.backend {
        config.backend = backend.parse()?;
    }
    Ok(config)
}

fn log_result(config: &Config, simulator: &Simulator, tx: &TxParams, result: &SimulationResult) {
    if !config.simulation_log {
        return;
    }
    let record = SimulationRecord::new(
        simulator.backend_name(),
        simulator.fork_id().map(String::from),
        tx.clone(),
        result.clone(),
    );
    if let Err(e) = record.append_to_file(&config.simulation_log_path) {
        warn!("Failed to write simulation log: {}", e);
    }
}

/// Lineage requested with --fork-id/--tip. Only the tenderly backend has forks.
fn fork_from_args(backend: BackendKind, fork_id: Option<&str>, tip: Option<&str>) -> Option<ForkState> {
    let (fork_id, tip) = fork_id.zip(tip)?;
    match backend {
        BackendKind::Tenderly => Some(ForkState::new(fork_id, tip)),
        BackendKind::EstimateGas => {
            warn!("{} backend has no forks, ignoring --fork-id {}", backend, fork_id);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fork_sim=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Command::Config = cli.command {
        config.print_summary();
        return Ok(());
    }

    config.validate()?;
    print_banner(&config);

    let fork = fork_from_args(config.backend, cli.fork_id.as_deref(), cli.tip.as_deref());
    let mut simulator = match config.backend {
        BackendKind::Tenderly => Simulator::tenderly(&config, fork),
        BackendKind::EstimateGas => Simulator::from_config(&config)?,
    };
    simulator.setup().await?;

    match cli.command {
        Command::Simulate { from, to, value, data, overrides } => {
            let mut tx = TxParams::new(from, to, parse_calldata(&data)?);
            tx.value = value;

            let overrides: Option<StateOverrides> = match overrides {
                Some(path) => Some(serde_json::from_str(&fs::read_to_string(path)?)?),
                None => None,
            };
            if overrides.is_some() && !simulator.supports_overrides() {
                warn!("{} backend ignores state overrides", simulator.backend_name());
            }

            let result = simulator.simulate(&tx, overrides.as_ref()).await;
            print_result(None, &result);
            log_result(&config, &simulator, &tx, &result);

            if !result.success {
                std::process::exit(1);
            }
        }

        Command::Batch { file } => {
            let steps: Vec<SimulationStep> = serde_json::from_str(&fs::read_to_string(&file)?)?;
            info!("Simulating {} transaction(s) from {}", steps.len(), file.display());

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
            spinner.set_message(format!("simulating {} step(s)...", steps.len()));
            spinner.enable_steady_tick(Duration::from_millis(120));

            let results = simulator.simulate_all(&steps).await;
            spinner.finish_and_clear();

            for (i, (step, result)) in steps.iter().zip(&results).enumerate() {
                print_result(Some(i), result);
                log_result(&config, &simulator, &step.tx, result);
            }

            let failed = results.iter().filter(|r| !r.success).count();
            println!();
            println!(
                "{} succeeded, {} failed{}",
                results.len() - failed,
                failed,
                simulator
                    .fork_state()
                    .map(|s| format!(" (fork {} now at {})", s.fork_id, s.tip))
                    .unwrap_or_default()
            );

            if failed > 0 {
                std::process::exit(1);
            }
        }

        Command::Config => unreachable!("handled before setup"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_args_only_apply_to_tenderly() {
        assert_eq!(
            fork_from_args(BackendKind::Tenderly, Some("f1"), Some("t0")),
            Some(ForkState::new("f1", "t0"))
        );
        assert_eq!(fork_from_args(BackendKind::EstimateGas, Some("f1"), Some("t0")), None);
        assert_eq!(fork_from_args(BackendKind::Tenderly, None, None), None);
    }

    #[test]
    fn test_cli_requires_fork_id_and_tip_together() {
        assert!(Cli::try_parse_from(["fork-sim", "--fork-id", "f1", "config"]).is_err());

        let cli = Cli::try_parse_from(["fork-sim", "--fork-id", "f1", "--tip", "t0", "config"])
            .unwrap();
        assert_eq!(cli.fork_id.as_deref(), Some("f1"));
        assert_eq!(cli.tip.as_deref(), Some("t0"));
    }
}
