//! System assembly: wires a validated [`Config`] into a [`Bus`] carrying main
//! DRAM, the reset-vector/management/mailbox ROM region, and CLINT.
//!
//! There is no UART/PLIC/VirtIO/SysCon here: this target is bare-metal and
//! single-purpose, and the only MMIO a core observes beyond RAM and the timer
//! is the fixed enclave-isolation region the CPU itself intercepts before it
//! would ever reach the bus (see `core::Cpu::mem_read`/`mem_write`).

use std::sync::Arc;

use crate::common::constants::{CLINT_BASE, DEFAULT_RSTVEC, DRAM_BASE, INSNS_PER_RTC_TICK, TAGDIRECTORY_BASE};
use crate::config::Config;
use crate::soc::devices::Clint;
use crate::soc::interconnect::Bus;
use crate::soc::memory::Memory;
use crate::soc::memory::buffer::DramBuffer;

/// Bus transfer width in bytes (one doubleword).
const BUS_WIDTH_BYTES: u64 = 8;
/// Base bus latency in cycles; this simulator doesn't model contention.
const BUS_LATENCY_CYCLES: u64 = 0;

/// The assembled system: a bus with DRAM, the reset-vector ROM region, and
/// CLINT attached. Per-core state (CPUs, MMUs, caches) and enclave isolation
/// state (tag directory, mailbox contents via the bus, management shim,
/// enclave records) live in [`crate::sim::simulator::Simulator`], which owns
/// a `System` alongside them.
pub struct System {
    /// The shared interconnect every core issues fetches/loads/stores through.
    pub bus: Bus,
}

impl System {
    /// Builds the bus and attaches DRAM, ROM, and CLINT per `config`.
    ///
    /// The ROM region spans from [`DEFAULT_RSTVEC`] up to (not including)
    /// [`TAGDIRECTORY_BASE`], covering the reset-vector table, the
    /// enclave-id table, the management shim's code region, and the mailbox;
    /// the tag directory itself is not bus-backed, since the CPU intercepts
    /// that address range directly.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let mut bus = Bus::new(BUS_WIDTH_BYTES, BUS_LATENCY_CYCLES);

        let dram_bytes = config.mem_mib as usize * 1024 * 1024;
        let dram = Arc::new(DramBuffer::new(dram_bytes));
        bus.add_device(Box::new(Memory::new(dram, DRAM_BASE)));

        let rom_bytes = (TAGDIRECTORY_BASE - DEFAULT_RSTVEC) as usize;
        let rom = Arc::new(DramBuffer::new(rom_bytes));
        bus.add_device(Box::new(Memory::new(rom, DEFAULT_RSTVEC)));

        bus.add_device(Box::new(Clint::new(CLINT_BASE, INSNS_PER_RTC_TICK)));

        Self { bus }
    }
}

#[cfg(test)]
mod tests {
    use super::System;
    use crate::common::constants::{CLINT_BASE, DRAM_BASE};
    use crate::config::Config;

    #[test]
    fn attaches_dram_and_clint_at_their_fixed_bases() {
        let mut system = System::new(&Config::default());
        assert!(system.bus.is_valid_address(DRAM_BASE));
        assert!(system.bus.is_valid_address(CLINT_BASE));
        system.bus.write_u64(DRAM_BASE, 0xdead_beef);
        assert_eq!(system.bus.read_u64(DRAM_BASE), 0xdead_beef);
    }
}
