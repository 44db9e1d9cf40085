//! Multi-core RISC-V simulator with hardware-enforced enclave isolation.
//!
//! This crate implements a functional (not cycle-accurate), instruction-level
//! RV64IMA simulator extended with a tagged-memory enclave isolation scheme:
//! 1. **Core:** single-issue, no pipeline, no floating point, no compressed
//!    instructions (see crate docs for what's out of scope and why). Every
//!    fetch/load/store carries the issuing core's current [`core::enclave::EnclaveId`]
//!    through the MMU's tag check.
//! 2. **Enclave isolation:** a page-granular owner/reader tag directory, a
//!    mailbox-based wire protocol cores use to talk to a management shim, and
//!    the shim's `CREATE_ENCLAVE`/`DONATE_PAGE`/`SWITCH_ENCLAVE` state machine.
//! 3. **Memory:** a tagged MMU (bare or 3-level-walked), per-core split L1
//!    caches, and a shared or partitioned L2 (`None`/RMT/static) for
//!    cache-side-channel experiments, backed by a DRAM row-buffer model.
//! 4. **ISA:** decoding and execution for RV64I/M/A and just enough of the
//!    privileged architecture (`SYSTEM` opcode, CSRs) to drive the custom
//!    control registers the isolation scheme and mailbox protocol use.
//! 5. **SoC:** a minimal bus carrying DRAM, the reset-vector/management/mailbox
//!    ROM region, and CLINT — no UART, PLIC, or VirtIO; this target is
//!    bare-metal and single-purpose.
//! 6. **Simulation:** [`sim::simulator::Simulator`], the round-robin driver
//!    that owns the core table, bus, tag directory, cache hierarchy, and
//!    management shim; a binary loader; configuration; and statistics.

/// Common types and constants (addresses, registers, traps, access types).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// CPU core (arch state, execution, memory/trap, MMU, caches, enclave isolation).
pub mod core;
/// Instruction set (decode, instruction, ABI, RV64I/M/A, privileged).
pub mod isa;
/// Simulation: `Simulator` driver, binary loader.
pub mod sim;
/// System-on-chip (builder, bus, devices, memory, traits).
pub mod soc;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Main CPU type; holds registers, MMU, caches, and per-core enclave state.
pub use crate::core::Cpu;
/// Top-level simulator; owns the core table, bus, and enclave isolation state.
pub use crate::sim::simulator::Simulator;
/// Top-level system (bus, memory, devices); construct with `System::new`.
pub use crate::soc::System;
