//! Shared test infrastructure.
//!
//! The driver scenarios script one instruction at a time rather than hand
//! assembling loops: a test writes a single instruction at a core's current
//! `pc`, steps it, inspects the result, and decides what to write next. This
//! mirrors the hand-encoded single instructions already used by the
//! `Cpu`-level unit tests, just strung together across a scenario instead of
//! one instruction per test.

use enclave_sim_core::core::enclave::{SwitchRequest, TagDirectory};
use enclave_sim_core::core::units::cache::CacheHierarchy;
use enclave_sim_core::core::StepEffects;
use enclave_sim_core::isa::privileged::{funct3 as sys_funct3, OP_SYSTEM};
use enclave_sim_core::isa::rv64i::{funct3, opcodes};
use enclave_sim_core::{Cpu, Simulator};

/// `ADDI rd, rs1, imm` (`imm` is sign-extended from 12 bits, matching the
/// real encoding's range).
#[must_use]
pub fn addi(rd: usize, rs1: usize, imm: i32) -> u32 {
    (((imm as u32) & 0xFFF) << 20) | ((rs1 as u32) << 15) | (funct3::ADD_SUB << 12) | ((rd as u32) << 7) | opcodes::OP_IMM
}

/// `SB rs2, imm(rs1)`.
#[must_use]
pub fn sb(rs1: usize, rs2: usize, imm: i32) -> u32 {
    store(rs1, rs2, imm, funct3::SB)
}

/// `SD rs2, imm(rs1)`.
#[must_use]
pub fn sd(rs1: usize, rs2: usize, imm: i32) -> u32 {
    store(rs1, rs2, imm, funct3::SD)
}

fn store(rs1: usize, rs2: usize, imm: i32, funct3_val: u32) -> u32 {
    let imm = imm as u32;
    let imm_lo = imm & 0x1F;
    let imm_hi = (imm >> 5) & 0x7F;
    (imm_hi << 25) | ((rs2 as u32) << 20) | ((rs1 as u32) << 15) | (funct3_val << 12) | (imm_lo << 7) | opcodes::OP_STORE
}

/// `LBU rd, imm(rs1)`.
#[must_use]
pub fn lbu(rd: usize, rs1: usize, imm: i32) -> u32 {
    load(rd, rs1, imm, funct3::LBU)
}

/// `LD rd, imm(rs1)`.
#[must_use]
pub fn ld(rd: usize, rs1: usize, imm: i32) -> u32 {
    load(rd, rs1, imm, funct3::LD)
}

fn load(rd: usize, rs1: usize, imm: i32, funct3_val: u32) -> u32 {
    ((imm as u32 & 0xFFF) << 20) | ((rs1 as u32) << 15) | (funct3_val << 12) | ((rd as u32) << 7) | opcodes::OP_LOAD
}

/// `CSRRW rd, csr, rs1`.
#[must_use]
pub fn csrrw(rd: usize, csr: u32, rs1: usize) -> u32 {
    ((csr & 0xFFF) << 20) | ((rs1 as u32) << 15) | (sys_funct3::CSRRW << 12) | ((rd as u32) << 7) | OP_SYSTEM
}

/// `CSRRS rd, csr, x0` - read a CSR without writing it.
#[must_use]
pub fn csrr(rd: usize, csr: u32) -> u32 {
    ((csr & 0xFFF) << 20) | (sys_funct3::CSRRS << 12) | ((rd as u32) << 7) | OP_SYSTEM
}

/// Writes a single instruction at core `core`'s current `pc` and steps it,
/// applying the same cross-core effects (`flush_tlbs`, `coherence_check`)
/// `Simulator::step_quantum` would.
pub fn run_one(sim: &mut Simulator, core: usize, instr: u32) -> StepEffects {
    let pc = sim.cores[core].pc;
    sim.system.bus.write_u32(pc, instr);
    let Simulator {
        cores,
        system,
        tag_directory,
        l2,
        dram_bank,
        ..
    } = sim;
    let num_slots = cores.len();
    let eff = cores[core].step(&mut system.bus, tag_directory, l2, dram_bank, num_slots);
    if eff.flush_tlbs {
        for c in cores.iter_mut() {
            c.mmu.flush_all();
        }
    }
    if let Some(addr) = eff.coherence_check {
        apply_coherence_fixup(cores, tag_directory, core, addr);
    }
    eff
}

fn apply_coherence_fixup(cores: &mut [Cpu], tag_directory: &TagDirectory, reader: usize, addr: u64) {
    let Some(page) = tag_directory.page_of(addr) else {
        return;
    };
    let owner = tag_directory.get(page).owner;
    let Some(writer) = cores.iter().position(|c| c.enclave_id == owner) else {
        return;
    };
    if writer == reader {
        return;
    }
    let (lo, hi) = if writer < reader { (writer, reader) } else { (reader, writer) };
    let (left, right) = cores.split_at_mut(hi);
    let (writer_cache, reader_cache) = if writer == lo {
        (&mut left[lo].cache.l1d, &mut right[0].cache.l1d)
    } else {
        (&mut right[0].cache.l1d, &mut left[lo].cache.l1d)
    };
    CacheHierarchy::coherence_fixup(writer_cache, reader_cache, addr);
}

/// Runs the management shim's mailbox scan once, applying any resulting
/// `SWITCH_ENCLAVE` dispatch directly to the target core, as
/// `Simulator::run` does between quanta.
pub fn shim_step(sim: &mut Simulator) {
    let Simulator {
        shim,
        system,
        tag_directory,
        enclaves,
        ..
    } = sim;
    let Some(req) = shim.as_mut().and_then(|s| s.step(&mut system.bus, tag_directory, enclaves)) else {
        return;
    };
    dispatch(sim, req);
}

fn dispatch(sim: &mut Simulator, req: SwitchRequest) {
    let core = &mut sim.cores[req.target_core];
    core.enclave_id = req.enclave_id;
    core.pc = req.entry_pc;
    core.halted = false;
}
