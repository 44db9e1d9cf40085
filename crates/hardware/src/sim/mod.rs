//! Simulation driver and program loading.
//!
//! Provides the round-robin [`simulator::Simulator`] that drives the core
//! table to completion, and utilities for loading binaries into memory and
//! setting up the initial system state.

/// Binary loading: program image, management-shim image, enclave-id table.
pub mod loader;

/// The round-robin simulator driver.
pub mod simulator;
