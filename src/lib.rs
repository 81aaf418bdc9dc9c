//! fork-sim - Transaction Simulation
//!
//! Answers "would this transaction succeed, and for how much gas?" without
//! touching a live network, by driving either a hosted Tenderly fork or a
//! plain `eth_estimateGas` node behind one `Simulator` façade.

pub mod config;
pub mod simulator;

pub use config::{BackendKind, Config, SimulationRecord};
pub use simulator::{
    ForkState, SimulationBackend, SimulationError, SimulationResult, SimulationStep, Simulator,
    StateOverrides, TxParams,
};
