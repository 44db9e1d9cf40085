//! Global system constants: memory layout, page geometry, and driver timing.
//!
//! This module defines system-wide constants used across the simulator:
//! 1. **Memory geometry:** page size/shift.
//! 2. **Memory map:** fixed physical bases for DRAM, the reset-vector and
//!    enclave-id ROMs, the management shim, the mailbox, the tag directory,
//!    and CLINT.
//! 3. **Driver timing:** the round-robin quantum and the timer-tick ratio.

/// Page size in bytes (4KB).
pub const PAGE_SIZE: u64 = 4096;

/// Number of bits to shift to convert between bytes and pages.
pub const PAGE_SHIFT: u64 = 12;

// --- Memory map (see crate docs for the full layout) ---

/// Base physical address of main DRAM.
pub const DRAM_BASE: u64 = 0x8000_0000;

/// Base physical address of the reset-vector ROM.
pub const DEFAULT_RSTVEC: u64 = 0x1000;

/// Base physical address of the enclave-core-index -> start-address table,
/// one page above the reset vector.
pub const ENCLAVE_ID_ROM_BASE: u64 = DEFAULT_RSTVEC + PAGE_SIZE;

/// Base physical address of the management shim's code region.
pub const MANAGEMENT_ENCLAVE_BASE: u64 = DEFAULT_RSTVEC + 2 * PAGE_SIZE;

/// Size in bytes reserved for the management shim's code region.
pub const MANAGEMENT_ENCLAVE_SIZE: u64 = PAGE_SIZE;

/// Base physical address of the mailbox region (one slot per core).
pub const MAILBOX_BASE: u64 = MANAGEMENT_ENCLAVE_BASE + MANAGEMENT_ENCLAVE_SIZE;

/// Base physical address of the tag directory.
pub const TAGDIRECTORY_BASE: u64 = MAILBOX_BASE + PAGE_SIZE;

/// Base physical address of CLINT (timer / software interrupts).
pub const CLINT_BASE: u64 = 0x0200_0000;

// --- Driver timing ---

/// Number of instructions each core steps per round-robin quantum.
pub const INTERLEAVE: u64 = 100;

/// Instructions-per-quantum to real-time-clock-ticks ratio; the CLINT advances
/// by `INTERLEAVE / INSNS_PER_RTC_TICK` ticks per quantum, carrying the
/// remainder across rounds.
pub const INSNS_PER_RTC_TICK: u64 = 10;

/// Default number of entries in each per-core TLB (instruction and data).
pub const DEFAULT_TLB_ENTRIES: usize = 64;

// --- DRAM-bank row-buffer model ---

/// Number of independent DRAM banks modeled for row-buffer hit/miss tracking.
pub const DRAM_BANK_COUNT: usize = 8;

/// Row-buffer size in bytes per bank.
pub const DRAM_ROW_BYTES: u64 = 8192;
