//! Program and management-binary loading.
//!
//! The reset-vector ROM bootstrap described in the design — a hart reads its
//! own id, looks it up in a table at [`ENCLAVE_ID_ROM_BASE`], and jumps to
//! either the normal-world entry point or the management shim's entry point —
//! is not executed as a literal RV64I trampoline here: [`Simulator::new`]
//! (see `sim::simulator`) sets each core's initial `pc`/`halted`/`enclave_id`
//! directly, the same "consumed as a primitive" treatment the management
//! binary itself gets (see [`crate::core::enclave::shim`]). This module still
//! writes the table's content into ROM for inspectability, and still loads
//! the management binary's bytes into its code region, even though neither
//! is ever fetched through: a debugger attached to the simulator sees the
//! same bytes a real boot would have placed there.

use crate::common::constants::{DRAM_BASE, ENCLAVE_ID_ROM_BASE, MANAGEMENT_ENCLAVE_BASE, MANAGEMENT_ENCLAVE_SIZE};
use crate::config::SimError;
use crate::soc::interconnect::Bus;

/// Reads the bare-metal program binary from disk.
pub fn read_program_binary(path: &str) -> Result<Vec<u8>, SimError> {
    std::fs::read(path).map_err(|source| SimError::ProgramBinaryUnreadable {
        path: path.to_string(),
        source,
    })
}

/// Reads the precompiled management-shim binary from disk.
pub fn read_management_binary(path: &str) -> Result<Vec<u8>, SimError> {
    std::fs::read(path).map_err(|source| SimError::ManagementBinaryUnreadable {
        path: path.to_string(),
        source,
    })
}

/// Loads the program binary into DRAM at `entry_pc`.
pub fn load_program(bus: &mut Bus, data: &[u8], entry_pc: u64) {
    bus.load_binary_at(data, entry_pc);
}

/// Loads the management binary's bytes into its fixed ROM code region,
/// truncated to [`MANAGEMENT_ENCLAVE_SIZE`] if larger (the shim's observable
/// behavior is driven by `ManagementShim::step`, not by executing these
/// bytes, so an oversized image is a non-fatal inspectability limitation
/// rather than a configuration error).
pub fn load_management(bus: &mut Bus, data: &[u8]) {
    let cap = MANAGEMENT_ENCLAVE_SIZE as usize;
    let slice = if data.len() > cap { &data[..cap] } else { data };
    bus.load_binary_at(slice, MANAGEMENT_ENCLAVE_BASE);
}

/// Writes the hart-id -> normal-world-entry-address table into the
/// enclave-id ROM, one `u64` per configured core (normal cores get the
/// program's entry point; enclave-designated and management "cores" get
/// zero, since they are dispatched dynamically by the management shim
/// rather than via this table).
pub fn write_enclave_id_table(bus: &mut Bus, procs: usize, total_cores: usize, entry_pc: u64) {
    for core in 0..total_cores {
        let value = if core < procs { entry_pc } else { 0 };
        bus.write_u64(ENCLAVE_ID_ROM_BASE + core as u64 * 8, value);
    }
}

/// Default program load address / entry point when `Config::start_pc` is unset.
#[must_use]
pub const fn default_entry_pc() -> u64 {
    DRAM_BASE
}

#[cfg(test)]
mod tests {
    use super::{load_management, load_program, write_enclave_id_table};
    use crate::common::constants::{DRAM_BASE, ENCLAVE_ID_ROM_BASE, MANAGEMENT_ENCLAVE_BASE};
    use crate::config::Config;
    use crate::soc::System;

    #[test]
    fn program_bytes_land_at_the_entry_address() {
        let mut system = System::new(&Config::default());
        load_program(&mut system.bus, &[0x13, 0x00, 0x00, 0x00], DRAM_BASE);
        assert_eq!(system.bus.read_u32(DRAM_BASE), 0x0000_0013);
    }

    #[test]
    fn management_binary_lands_in_its_code_region() {
        let mut system = System::new(&Config::default());
        load_management(&mut system.bus, &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(system.bus.read_u32(MANAGEMENT_ENCLAVE_BASE), 0xDDCC_BBAA);
    }

    #[test]
    fn enclave_id_table_marks_only_normal_cores() {
        let mut system = System::new(&Config::default());
        write_enclave_id_table(&mut system.bus, 2, 4, DRAM_BASE);
        assert_eq!(system.bus.read_u64(ENCLAVE_ID_ROM_BASE), DRAM_BASE);
        assert_eq!(system.bus.read_u64(ENCLAVE_ID_ROM_BASE + 8), DRAM_BASE);
        assert_eq!(system.bus.read_u64(ENCLAVE_ID_ROM_BASE + 16), 0);
        assert_eq!(system.bus.read_u64(ENCLAVE_ID_ROM_BASE + 24), 0);
    }
}
