//! Diagnostic tool - Check simulator configuration
//!
//! Run with: cargo run --bin diagnose

use fork_sim::simulator::{resolve_fork_source, ForkSource};
use fork_sim::{BackendKind, Config};
use std::env;

fn marker(key: &str) -> &'static str {
    if env::var(key).is_ok() {
        "✅ Set"
    } else {
        "❌ Not set"
    }
}

/// Keep the head and tail of long URLs so API keys in the middle stay hidden
fn shorten(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    if chars.len() <= 50 {
        return url.to_string();
    }
    let head: String = chars[..30].iter().collect();
    let tail: String = chars[chars.len() - 15..].iter().collect();
    format!("{}...{}", head, tail)
}

fn main() {
    println!("🔍 FORK-SIM DIAGNOSTIC CHECK\n");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Could not load configuration: {}", e);
            std::process::exit(1);
        }
    };

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("SIMULATION_BACKEND", "tenderly", "Which backend runs simulations?"),
        ("NETWORK_ID", "1", "Chain forked / encoded against"),
        ("FORK_TIMEOUT_SECS", "20", "Fork creation timeout"),
        ("SIMULATE_TIMEOUT_SECS", "30", "Per-simulation timeout"),
        ("SIMULATION_LOG", "false", "Log simulations to JSONL?"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let origin = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, origin);
        println!("    └─ {}\n", desc);
    }

    println!("  RPC_URL: {}", shorten(&config.rpc_url));

    println!("\n═══════════════════════════════════════════════════");
    println!("                     TENDERLY                       ");
    println!("═══════════════════════════════════════════════════\n");

    for key in [
        "TENDERLY_TOKEN",
        "TENDERLY_ACCOUNT_ID",
        "TENDERLY_PROJECT",
        "TENDERLY_FORK_ID",
        "TENDERLY_FORK_LAST_TX_ID",
        "TENDERLY_TEST_NET_RPC",
    ] {
        println!("  {:<26} {}", format!("{}:", key), marker(key));
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    if let Err(e) = config.validate() {
        println!("  ❌ {}", e);
        std::process::exit(1);
    }

    match config.backend {
        BackendKind::EstimateGas => {
            println!("  ⚠️  estimate-gas backend: no replay links, state overrides ignored");
        }
        BackendKind::Tenderly => match resolve_fork_source(None, &config) {
            Ok(ForkSource::Environment(state)) => {
                println!("  ✅ Will continue fork {} at {}", state.fork_id, state.tip);
            }
            Ok(ForkSource::Testnet(url)) => {
                println!("  ✅ Will send transactions to test network {}", url);
                println!("     (state overrides are ignored in this mode)");
            }
            Ok(ForkSource::Create) => {
                println!("  ✅ Will create a new fork on network {}", config.network_id);
            }
            Ok(ForkSource::Explicit(_)) => {}
            Err(e) => {
                println!("  ❌ {}", e);
                std::process::exit(1);
            }
        },
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_keeps_short_urls() {
        assert_eq!(shorten("http://localhost:8545"), "http://localhost:8545");
    }

    #[test]
    fn test_shorten_long_url_on_char_boundaries() {
        let url = format!("https://rpc.ex\u{e4}mple.org/{}/v2/\u{fc}ber", "k\u{e9}y".repeat(20));
        let short = shorten(&url);
        assert!(short.starts_with("https://rpc.ex\u{e4}mple.org/"));
        assert!(short.ends_with("/v2/\u{fc}ber"));
        assert_eq!(short.chars().count(), 30 + 3 + 15);
    }
}
