//! The round-robin simulator driver (§4.7).
//!
//! [`Simulator`] owns the core table, the bus, and every piece of enclave
//! isolation state a single core cannot apply to itself: the tag directory,
//! the (possibly partitioned) L2, the DRAM-bank model, the management shim,
//! and the shim's enclave records. [`Simulator::run`] drives all of it to
//! completion: each non-halted core gets an `INTERLEAVE`-instruction quantum,
//! `StepEffects` are applied immediately after every single instruction
//! (never batched to the end of a quantum, since a TLB flush or coherence
//! fixup must be visible before the next instruction on any core observes
//! it), the management shim's mailbox scan runs once per quantum, and the
//! loop exits once every core has latched the bare-metal halt CSR.

use tracing::{info, warn};

use crate::common::constants::{
    DRAM_BANK_COUNT, DRAM_ROW_BYTES, MAILBOX_BASE, PAGE_SHIFT, TAGDIRECTORY_BASE,
};
use crate::common::PhysAddr;
use crate::config::{Config, PartitioningMode};
use crate::core::enclave::{EnclaveId, EnclaveRecord, ManagementShim, TagDirectory};
use crate::core::units::cache::dram_bank::DramBankModel;
use crate::core::units::cache::rmt::RmtCache;
use crate::core::units::cache::set_assoc::SetAssocCache;
use crate::core::units::cache::static_part::StaticPartitioned;
use crate::core::units::cache::{CacheHierarchy, L2};
use crate::core::Cpu;
use crate::sim::loader;
use crate::soc::System;
use crate::stats::SimStats;

/// Number of instructions each core steps before yielding to the next in the
/// round-robin order.
const INTERLEAVE: u64 = crate::common::constants::INTERLEAVE;

/// Seed for the shared/partitioned L2's replacement LFSR; per-core L1s derive
/// distinct seeds from their core index instead (see `CacheHierarchy::new`).
const L2_LFSR_SEED: u16 = 0xFFFF;

/// The assembled simulator: core table, bus, and enclave isolation state.
pub struct Simulator {
    /// Per-core architectural state, indexed by hart/mailbox-slot index.
    pub cores: Vec<Cpu>,
    /// The bus (DRAM, reset-vector/management/mailbox ROM, CLINT).
    pub system: System,
    /// Page-granular owner/reader tags gating every memory access.
    pub tag_directory: TagDirectory,
    /// The shared or partitioned L2.
    pub l2: L2,
    /// DRAM-bank row-buffer model, consulted on every L2 miss.
    pub dram_bank: DramBankModel,
    /// The management shim, present only when `config.enclave_cores > 0`.
    pub shim: Option<ManagementShim>,
    /// Shim-side lifecycle bookkeeping for every created enclave.
    pub enclaves: Vec<EnclaveRecord>,
    /// Collected statistics, printed once at halt.
    pub stats: SimStats,
    /// Whether `-l`/`--log` per-instruction tracing is enabled.
    log: bool,
}

impl Simulator {
    /// Builds a simulator from a validated `config`, the raw bytes of the
    /// bare-metal program (loaded at `config.start_pc` or `DRAM_BASE`), and
    /// the raw bytes of the precompiled management-shim image.
    ///
    /// Core layout: `config.procs` normal-world cores (`EnclaveId::DEFAULT`),
    /// followed by `config.enclave_cores` enclave-designated cores parked
    /// halted until a `SWITCH_ENCLAVE` dispatch targets them. The management
    /// shim itself is not a stepped `Cpu` — its program is "consumed as a
    /// primitive" (see `core::enclave::shim` docs) — so the core table has
    /// `config.procs + config.enclave_cores` entries, even though
    /// `config.total_cores()` (used for the enclave-id ROM table and mailbox
    /// slot count) reserves one more.
    #[must_use]
    pub fn new(config: &Config, program: &[u8], management: &[u8]) -> Self {
        let mut system = System::new(config);

        let entry_pc = config.start_pc.unwrap_or_else(loader::default_entry_pc);
        loader::load_program(&mut system.bus, program, entry_pc);
        loader::load_management(&mut system.bus, management);
        loader::write_enclave_id_table(&mut system.bus, config.procs, config.total_cores(), entry_pc);

        let dram_bytes = config.mem_mib * 1024 * 1024;
        let num_pages = (dram_bytes / crate::common::constants::PAGE_SIZE) as usize;
        let tag_directory = TagDirectory::new(
            num_pages,
            PhysAddr::new(TAGDIRECTORY_BASE),
            crate::common::constants::DRAM_BASE,
            PAGE_SHIFT,
        );

        let l2 = match config.l2_partitioning {
            PartitioningMode::None => {
                L2::None(SetAssocCache::new(config.l2.sets, config.l2.ways, config.l2.line_bytes, L2_LFSR_SEED))
            }
            PartitioningMode::Rmt => {
                L2::Rmt(RmtCache::new(config.l2.sets, config.l2.ways, config.l2.line_bytes, L2_LFSR_SEED))
            }
            PartitioningMode::Static => {
                L2::Static(StaticPartitioned::new(config.l2.sets, config.l2.ways, config.l2.line_bytes))
            }
        };

        let dram_bank = DramBankModel::new(DRAM_BANK_COUNT, DRAM_ROW_BYTES);

        let num_phys_cores = config.procs + config.enclave_cores;
        let mut cores = Vec::with_capacity(num_phys_cores);
        for i in 0..config.procs {
            cores.push(Cpu::new(
                i,
                entry_pc,
                EnclaveId::DEFAULT,
                config.tlb_entries,
                config.ic.sets,
                config.ic.ways,
                config.ic.line_bytes,
                config.dc.sets,
                config.dc.ways,
                config.dc.line_bytes,
                config.start_halted,
            ));
        }
        for i in config.procs..num_phys_cores {
            cores.push(Cpu::new(
                i,
                0,
                EnclaveId::DEFAULT,
                config.tlb_entries,
                config.ic.sets,
                config.ic.ways,
                config.ic.line_bytes,
                config.dc.sets,
                config.dc.ways,
                config.dc.line_bytes,
                true,
            ));
        }

        let shim = (config.enclave_cores > 0).then(|| ManagementShim::new(MAILBOX_BASE, num_phys_cores));

        Self {
            stats: SimStats::new(num_phys_cores, config.histogram),
            cores,
            system,
            tag_directory,
            l2,
            dram_bank,
            shim,
            enclaves: Vec::new(),
            log: config.log,
        }
    }

    /// Runs every core to completion and returns the process exit code: `0`
    /// on a normal halt (the only way this loop currently ends).
    pub fn run(&mut self) -> i32 {
        loop {
            for i in 0..self.cores.len() {
                self.step_quantum(i);
            }
            if let Some(req) = self.shim.as_mut().and_then(|shim| {
                shim.step(&mut self.system.bus, &mut self.tag_directory, &mut self.enclaves)
            }) {
                if self.log {
                    info!(core = req.target_core, enclave = %req.enclave_id, pc = req.entry_pc, "dispatching SWITCH_ENCLAVE");
                }
                let core = &mut self.cores[req.target_core];
                core.enclave_id = req.enclave_id;
                core.pc = req.entry_pc;
                core.halted = false;
            }
            // The shim mutates tag ownership directly (DONATE_PAGE) outside
            // any single core's `StepEffects`, so no `flush_tlbs` signal covers
            // it. A stale TLB entry here would only ever be *stricter* than
            // the fresh tag (no core has translated a page before it owns
            // it), but flush regardless to keep the invariant uniform with
            // every other tag mutation path.
            for core in &mut self.cores {
                core.mmu.flush_all();
            }
            if self.cores.iter().all(|c| c.halted) {
                break;
            }
        }
        self.stats.print();
        0
    }

    /// Steps core `i` for up to `INTERLEAVE` instructions, stopping early if
    /// it halts mid-quantum, applying `StepEffects` after every instruction.
    fn step_quantum(&mut self, i: usize) {
        let num_slots = self.cores.len();
        for _ in 0..INTERLEAVE {
            if self.cores[i].halted {
                break;
            }
            let pc_before = self.cores[i].pc;
            self.stats.record_pc(i, pc_before);

            let eff = self.cores[i].step(
                &mut self.system.bus,
                &mut self.tag_directory,
                &mut self.l2,
                &mut self.dram_bank,
                num_slots,
            );
            self.system.bus.tick();

            if let Some(hit) = eff.l1i_hit {
                self.stats.record_l1i(i, hit);
            }
            if let Some(hit) = eff.l1d_hit {
                self.stats.record_l1d(i, hit);
            }
            if let Some(hit) = eff.l2_hit {
                self.stats.record_l2(hit);
            }
            if let Some(hit) = eff.dram_bank_hit {
                self.stats.record_dram_bank(hit);
            }
            if eff.rmt_soft_miss {
                self.stats.record_rmt_soft_miss();
            }
            self.stats.cores[i].instructions_retired = self.cores[i].instructions_retired;
            self.stats.cores[i].traps_taken = self.cores[i].traps_taken;

            if eff.trapped && self.log {
                warn!(core = i, trap = ?self.cores[i].last_trap, "trap delivered to management shim");
            }
            if eff.flush_tlbs {
                for core in &mut self.cores {
                    core.mmu.flush_all();
                }
            }
            if let Some(addr) = eff.coherence_check {
                self.apply_coherence_fixup(i, addr);
            }
            if let Some(byte) = eff.char_out {
                print!("{}", byte as char);
            }
        }
    }

    /// Cross-core coherence fixup: if another core currently owns the page
    /// `addr` falls in and has a dirty line for it, write that line back and
    /// invalidate `reader`'s stale copy.
    fn apply_coherence_fixup(&mut self, reader: usize, addr: u64) {
        let Some(page) = self.tag_directory.page_of(addr) else {
            return;
        };
        let owner = self.tag_directory.get(page).owner;
        let Some(writer) = self.cores.iter().position(|c| c.enclave_id == owner) else {
            return;
        };
        if writer == reader {
            return;
        }
        let (lo, hi) = if writer < reader { (writer, reader) } else { (reader, writer) };
        let (left, right) = self.cores.split_at_mut(hi);
        let (writer_cache, reader_cache) = if writer == lo {
            (&mut left[lo].cache.l1d, &mut right[0].cache.l1d)
        } else {
            (&mut right[0].cache.l1d, &mut left[lo].cache.l1d)
        };
        CacheHierarchy::coherence_fixup(writer_cache, reader_cache, addr);
    }
}

#[cfg(test)]
mod tests {
    use super::Simulator;
    use crate::config::Config;
    use crate::core::arch::csr::BARE_METAL_HALT;
    use crate::isa::privileged::{funct3, OP_SYSTEM};

    /// `CSRRW x0, BARE_METAL_HALT, x0`, encoded by hand: a single instruction
    /// that makes one core request halt immediately, so the driver loop
    /// exits on its own without needing a real compiled binary.
    fn halting_program() -> Vec<u8> {
        let instr = (BARE_METAL_HALT << 20) | (funct3::CSRRW << 12) | OP_SYSTEM;
        instr.to_le_bytes().to_vec()
    }

    #[test]
    fn run_halts_when_the_only_core_requests_halt() {
        let config = Config {
            procs: 1,
            ..Config::default()
        };
        let mut sim = Simulator::new(&config, &halting_program(), &[]);
        let code = sim.run();
        assert_eq!(code, 0);
        assert!(sim.cores[0].halted);
    }

    #[test]
    fn enclave_cores_start_parked_until_dispatched() {
        let config = Config {
            procs: 1,
            enclave_cores: 1,
            ..Config::default()
        };
        let sim = Simulator::new(&config, &halting_program(), &[]);
        assert_eq!(sim.cores.len(), 2);
        assert!(sim.cores[1].halted);
        assert!(sim.shim.is_some());
    }
}
