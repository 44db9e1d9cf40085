//! Per-core processor state and the instruction step loop.
//!
//! A [`Cpu`] carries the integer register file, program counter, current
//! [`EnclaveId`], per-core MMU and cache hierarchy, and the bookkeeping the
//! custom CSRs (see [`crate::core::arch::csr`]) operate on. [`Cpu::step`]
//! fetches one instruction through the tagged MMU and cache path, decodes it
//! with [`crate::isa::decode`], and executes it; faults are delivered by
//! redirecting the PC to the management shim's code region, per the design's
//! "a faulted enclave re-enters the management shim" rule. Cross-core effects
//! a single core cannot apply to itself (TLB flush after a tag mutation,
//! cache-coherence fixup against another core's L1) are reported back to the
//! driver in a [`StepEffects`] value rather than reached for directly.

/// Per-core architectural state (GPR file, custom CSR address map).
pub mod arch;

/// Enclave isolation: ids, tag directory, mailbox, lifecycle, management shim.
pub mod enclave;

/// Per-core execution units (MMU, cache hierarchy).
pub mod units;

use crate::common::constants::{
    MAILBOX_BASE, MANAGEMENT_ENCLAVE_BASE, MANAGEMENT_ENCLAVE_SIZE, PAGE_SHIFT, TAGDIRECTORY_BASE,
};
use crate::common::{AccessType, RegisterFile, Trap, VirtAddr};
use crate::core::arch::csr;
use crate::core::enclave::message::{MESSAGE_SIZE, OFFSET_TYPE};
use crate::core::enclave::{EnclaveId, Message, MessageType, TagDirectory};
use crate::core::units::cache::dram_bank::DramBankModel;
use crate::core::units::cache::{CacheHierarchy, HierarchyOutcome, L2};
use crate::core::units::mmu::Mmu;
use crate::isa::decode::decode;
use crate::isa::instruction::{Decoded, InstructionBits};
use crate::isa::privileged;
use crate::isa::rv64a;
use crate::isa::rv64i::{funct3, funct7, opcodes};
use crate::isa::rv64m;
use crate::soc::interconnect::Bus;

/// Effects of one [`Cpu::step`] that the driver must apply outside the
/// stepped core: a global TLB flush after a tag mutation (any core's TLB may
/// have cached the now-stale tag) and a cross-core coherence scan after a
/// load that missed this core's own L1 (see
/// [`CacheHierarchy::coherence_fixup`]).
#[derive(Debug, Default, Clone, Copy)]
pub struct StepEffects {
    /// A tag-directory mutation occurred; every core's TLB must be flushed.
    pub flush_tlbs: bool,
    /// This core's bare-metal-halt CSR was written.
    pub halt_requested: bool,
    /// A character was written to the bare-metal character-out CSR.
    pub char_out: Option<u8>,
    /// A load that missed this core's L1 touched this physical address;
    /// the driver should scan other cores' L1D for a dirty line there.
    pub coherence_check: Option<u64>,
    /// A trap was taken this step.
    pub trapped: bool,
    /// Whether the instruction fetch hit this core's L1I.
    pub l1i_hit: Option<bool>,
    /// Whether the load/store (if any) hit this core's L1D.
    pub l1d_hit: Option<bool>,
    /// Whether an L1 miss (fetch or data) hit the L2, present only when an
    /// L1 access actually missed.
    pub l2_hit: Option<bool>,
    /// Whether an L2 miss's DRAM-bank row-buffer access hit the open row.
    pub dram_bank_hit: Option<bool>,
    /// An RMT soft miss (hit in the RMT, miss in the backing slot) occurred.
    pub rmt_soft_miss: bool,
}

/// One simulated RV64IMA core, extended with the enclave tag-check pipeline.
///
/// Does not model a separate privilege-mode/trap-delegation architecture
/// (out of scope, see crate docs): on a fault the core's PC is simply
/// redirected to the management shim's code region, with the fault recorded
/// in `last_trap`/`mepc` for the shim (or a human, via `-d`) to inspect.
pub struct Cpu {
    /// Index of this core in the driver's core table; also its mailbox slot
    /// and hart id.
    pub index: usize,
    /// Integer register file.
    pub regs: RegisterFile,
    /// Program counter.
    pub pc: u64,
    /// Current enclave identifier; the issuer of every memory access this
    /// core makes.
    pub enclave_id: EnclaveId,
    /// Enclave id stashed by `SET_ARGUMENT_ID`, consumed by a following
    /// `ASSIGN_READER`/`DONATE_PAGE`/`CHANGE_PAGE_TAG` CSR write.
    pub argument_id: EnclaveId,
    /// Tagged MMU (translation + tag check + TLBs).
    pub mmu: Mmu,
    /// Split L1 instruction/data caches.
    pub cache: CacheHierarchy,
    /// Latched halt request (`BARE_METAL_HALT`).
    pub halted: bool,
    /// Running count of LLC misses attributed to this core's current
    /// enclave, exposed via `LLC_MISS_COUNT`.
    pub llc_miss_count: u64,
    /// Running count of RMT soft misses (see
    /// [`crate::core::units::cache::rmt`]).
    pub soft_miss_count: u64,
    /// Reservation address set by `LR.W`/`LR.D`, consumed (and cleared) by
    /// the next `SC.W`/`SC.D`.
    reservation: Option<u64>,
    /// Cause of the most recently taken trap, if any.
    pub last_trap: Option<Trap>,
    /// Saved PC at the point of the most recent trap.
    pub mepc: u64,
    /// Where a trap redirects execution. Defaults to the management shim's
    /// code region.
    pub trap_vector: u64,
    /// Count of instructions retired, for statistics.
    pub instructions_retired: u64,
    /// Count of traps taken, for statistics.
    pub traps_taken: u64,
}

impl Cpu {
    /// Creates a core at `index` with the given initial program counter,
    /// enclave id, TLB size, and per-core L1 instruction/data cache
    /// geometries. `halted` lets the driver park enclave-designated cores
    /// until a `SWITCH_ENCLAVE` dispatch.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        index: usize,
        pc: u64,
        enclave_id: EnclaveId,
        tlb_size: usize,
        ic_sets: usize,
        ic_ways: usize,
        ic_line_bytes: usize,
        dc_sets: usize,
        dc_ways: usize,
        dc_line_bytes: usize,
        halted: bool,
    ) -> Self {
        Self {
            index,
            regs: RegisterFile::new(),
            pc,
            enclave_id,
            argument_id: EnclaveId::INVALID,
            mmu: Mmu::new(tlb_size),
            cache: CacheHierarchy::new(ic_sets, ic_ways, ic_line_bytes, dc_sets, dc_ways, dc_line_bytes, index),
            halted,
            llc_miss_count: 0,
            soft_miss_count: 0,
            reservation: None,
            last_trap: None,
            mepc: 0,
            trap_vector: MANAGEMENT_ENCLAVE_BASE,
            instructions_retired: 0,
            traps_taken: 0,
        }
    }

    fn slot_base(index: usize) -> u64 {
        MAILBOX_BASE + index as u64 * MESSAGE_SIZE
    }

    fn read_message_slot(bus: &mut Bus, slot: usize) -> Message {
        let addr = Self::slot_base(slot);
        let mut buf = [0u8; MESSAGE_SIZE as usize];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = bus.read_u8(addr + i as u64);
        }
        Message::decode(&buf)
    }

    fn write_message_type(bus: &mut Bus, slot: usize, msg_type: MessageType) {
        let addr = Self::slot_base(slot) + OFFSET_TYPE;
        for (i, b) in (msg_type as u32).to_le_bytes().iter().enumerate() {
            bus.write_u8(addr + i as u64, *b);
        }
    }

    /// Posts a message into this core's own mailbox slot, exactly as a direct
    /// store to the mailbox region would: the `source` field is stamped with
    /// this core's current enclave id regardless of what the caller supplies.
    fn post_message(bus: &mut Bus, index: usize, enclave_id: EnclaveId, msg_type: MessageType, destination: EnclaveId, content: u64) {
        let msg = Message {
            msg_type,
            source: enclave_id,
            destination,
            content,
        };
        let addr = Self::slot_base(index);
        for (i, b) in msg.encode().iter().enumerate() {
            bus.write_u8(addr + i as u64, *b);
        }
    }

    /// Raw read through the tag-directory/mailbox MMIO special cases, or an
    /// ordinary bus read otherwise. `num_slots` bounds the mailbox region.
    fn mem_read(
        &mut self,
        bus: &mut Bus,
        tag_dir: &TagDirectory,
        paddr: u64,
        len: u64,
        num_slots: usize,
    ) -> u64 {
        if paddr >= TAGDIRECTORY_BASE && paddr < TAGDIRECTORY_BASE + tag_dir.size_bytes() {
            return tag_dir.mmio_load(paddr - TAGDIRECTORY_BASE, len);
        }
        let mailbox_end = MAILBOX_BASE + num_slots as u64 * MESSAGE_SIZE;
        if paddr >= MAILBOX_BASE && paddr < mailbox_end {
            let rel = (paddr - MAILBOX_BASE) % MESSAGE_SIZE;
            let slot = ((paddr - MAILBOX_BASE) / MESSAGE_SIZE) as usize;
            let slot_base = Self::slot_base(slot);
            let mut val = 0u64;
            for i in 0..len {
                val |= u64::from(bus.read_u8(slot_base + rel + i)) << (i * 8);
            }
            if rel == OFFSET_TYPE && len == 4 {
                let msg = Self::read_message_slot(bus, slot);
                if msg.msg_type != MessageType::Invalid && msg.destination == self.enclave_id {
                    Self::write_message_type(bus, slot, MessageType::Invalid);
                }
            }
            return val;
        }
        let mut val = 0u64;
        for i in 0..len {
            val |= u64::from(bus.read_u8(paddr + i)) << (i * 8);
        }
        val
    }

    /// Raw write through the tag-directory/mailbox MMIO special cases, or an
    /// ordinary bus write otherwise.
    fn mem_write(
        &mut self,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        paddr: u64,
        len: u64,
        value: u64,
        num_slots: usize,
    ) -> Result<bool, Trap> {
        if paddr >= TAGDIRECTORY_BASE && paddr < TAGDIRECTORY_BASE + tag_dir.size_bytes() {
            tag_dir.mmio_store(self.enclave_id, paddr - TAGDIRECTORY_BASE, len, value)?;
            return Ok(true);
        }
        let mailbox_end = MAILBOX_BASE + num_slots as u64 * MESSAGE_SIZE;
        if paddr >= MAILBOX_BASE && paddr < mailbox_end {
            let rel = (paddr - MAILBOX_BASE) % MESSAGE_SIZE;
            if rel + len > MESSAGE_SIZE {
                return Err(Trap::StoreAccessFault(paddr));
            }
            let own_base = Self::slot_base(self.index);
            for i in 0..len {
                bus.write_u8(own_base + rel + i, ((value >> (i * 8)) & 0xFF) as u8);
            }
            let src_addr = own_base + crate::core::enclave::message::OFFSET_SOURCE;
            for (i, b) in self.enclave_id.raw().to_le_bytes().iter().enumerate() {
                bus.write_u8(src_addr + i as u64, *b);
            }
            return Ok(false);
        }
        for i in 0..len {
            bus.write_u8(paddr + i, ((value >> (i * 8)) & 0xFF) as u8);
        }
        Ok(false)
    }

    /// Steps exactly one instruction. Returns the effects the driver must
    /// apply on this core's behalf to the rest of the system.
    pub fn step(
        &mut self,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        l2: &mut L2,
        dram: &mut DramBankModel,
        num_slots: usize,
    ) -> StepEffects {
        let mut eff = StepEffects::default();
        if self.halted {
            return eff;
        }

        let fetch = self
            .mmu
            .translate(VirtAddr::new(self.pc), AccessType::Fetch, self.enclave_id, bus, tag_dir);
        if let Some(trap) = fetch.trap {
            self.take_trap(trap, &mut eff);
            return eff;
        }
        let paddr = fetch.paddr.val();
        let (fetch_outcome, fetch_soft_miss) = self.cache.fetch(l2, self.enclave_id, paddr);
        self.account_outcome(fetch_outcome, fetch_soft_miss);
        eff.l1i_hit = Some(fetch_outcome == HierarchyOutcome::Hit);
        if fetch_outcome != HierarchyOutcome::Hit {
            eff.l2_hit = Some(fetch_outcome == HierarchyOutcome::MissHit);
        }
        eff.rmt_soft_miss |= fetch_soft_miss;

        let raw = bus.read_u32(paddr);
        let decoded = decode(raw);

        match self.execute(&decoded, bus, tag_dir, l2, dram, num_slots, &mut eff) {
            Ok(()) => {
                self.instructions_retired += 1;
            }
            Err(trap) => self.take_trap(trap, &mut eff),
        }
        eff
    }

    fn account_outcome(&mut self, outcome: HierarchyOutcome, soft_miss: bool) {
        if soft_miss {
            self.soft_miss_count += 1;
        }
        if outcome == HierarchyOutcome::MissMiss {
            self.llc_miss_count += 1;
        }
    }

    fn take_trap(&mut self, trap: Trap, eff: &mut StepEffects) {
        self.last_trap = Some(trap);
        self.mepc = self.pc;
        self.traps_taken += 1;
        eff.trapped = true;
        self.pc = self.trap_vector;
    }

    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        d: &Decoded,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        l2: &mut L2,
        dram: &mut DramBankModel,
        num_slots: usize,
        eff: &mut StepEffects,
    ) -> Result<(), Trap> {
        let mut next_pc = self.pc.wrapping_add(4);

        match d.opcode {
            opcodes::OP_LUI => self.regs.write(d.rd, d.imm as u64),
            opcodes::OP_AUIPC => self.regs.write(d.rd, self.pc.wrapping_add(d.imm as u64)),
            opcodes::OP_JAL => {
                self.regs.write(d.rd, next_pc);
                next_pc = self.pc.wrapping_add(d.imm as u64);
            }
            opcodes::OP_JALR => {
                let target = (self.regs.read(d.rs1).wrapping_add(d.imm as u64)) & !1u64;
                self.regs.write(d.rd, next_pc);
                next_pc = target;
            }
            opcodes::OP_BRANCH => {
                let a = self.regs.read(d.rs1);
                let b = self.regs.read(d.rs2);
                let taken = match d.funct3 {
                    funct3::BEQ => a == b,
                    funct3::BNE => a != b,
                    funct3::BLT => (a as i64) < (b as i64),
                    funct3::BGE => (a as i64) >= (b as i64),
                    funct3::BLTU => a < b,
                    funct3::BGEU => a >= b,
                    _ => return Err(Trap::IllegalInstruction(d.raw)),
                };
                if taken {
                    next_pc = self.pc.wrapping_add(d.imm as u64);
                }
            }
            opcodes::OP_IMM => self.exec_op_imm(d)?,
            opcodes::OP_IMM_32 => self.exec_op_imm32(d)?,
            opcodes::OP_REG => self.exec_op_reg(d)?,
            opcodes::OP_REG_32 => self.exec_op_reg32(d)?,
            opcodes::OP_LOAD => self.exec_load(d, bus, tag_dir, l2, dram, num_slots, eff)?,
            opcodes::OP_STORE => self.exec_store(d, bus, tag_dir, l2, dram, num_slots, eff)?,
            rv64a::opcodes::OP_AMO => self.exec_amo(d, bus, tag_dir, l2, dram, num_slots, eff)?,
            opcodes::OP_MISC_MEM => {}
            privileged::OP_SYSTEM => self.exec_system(d, bus, tag_dir, num_slots, eff)?,
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        }

        self.pc = next_pc;
        Ok(())
    }

    fn exec_op_imm(&mut self, d: &Decoded) -> Result<(), Trap> {
        let a = self.regs.read(d.rs1);
        let imm = d.imm as u64;
        let shamt = (d.imm as u32) & 0x3F;
        let val = match d.funct3 {
            funct3::ADD_SUB => a.wrapping_add(imm),
            funct3::SLT => u64::from((a as i64) < (d.imm)),
            funct3::SLTU => u64::from(a < imm),
            funct3::XOR => a ^ imm,
            funct3::OR => a | imm,
            funct3::AND => a & imm,
            funct3::SLL => a << (shamt & 0x3F),
            funct3::SRL_SRA => {
                if d.funct7 & funct7::SUB != 0 {
                    ((a as i64) >> (shamt & 0x3F)) as u64
                } else {
                    a >> (shamt & 0x3F)
                }
            }
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        };
        self.regs.write(d.rd, val);
        Ok(())
    }

    fn exec_op_imm32(&mut self, d: &Decoded) -> Result<(), Trap> {
        let a = self.regs.read(d.rs1) as u32;
        let imm = d.imm as u32;
        let shamt = imm & 0x1F;
        let val = match d.funct3 {
            funct3::ADD_SUB => a.wrapping_add(imm),
            funct3::SLL => a << shamt,
            funct3::SRL_SRA => {
                if d.funct7 == funct7::SUB {
                    ((a as i32) >> shamt) as u32
                } else {
                    a >> shamt
                }
            }
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        };
        self.regs.write(d.rd, (val as i32) as u64);
        Ok(())
    }

    fn exec_op_reg(&mut self, d: &Decoded) -> Result<(), Trap> {
        let a = self.regs.read(d.rs1);
        let b = self.regs.read(d.rs2);
        if d.funct7 == rv64m::opcodes::M_EXTENSION {
            let val = match d.funct3 {
                rv64m::funct3::MUL => a.wrapping_mul(b),
                rv64m::funct3::MULH => (((a as i64 as i128) * (b as i64 as i128)) >> 64) as u64,
                rv64m::funct3::MULHSU => (((a as i64 as i128) * (b as i128)) >> 64) as u64,
                rv64m::funct3::MULHU => (((a as u128) * (b as u128)) >> 64) as u64,
                rv64m::funct3::DIV => {
                    if b == 0 {
                        u64::MAX
                    } else if a as i64 == i64::MIN && b as i64 == -1 {
                        a
                    } else {
                        ((a as i64).wrapping_div(b as i64)) as u64
                    }
                }
                rv64m::funct3::DIVU => {
                    if b == 0 {
                        u64::MAX
                    } else {
                        a / b
                    }
                }
                rv64m::funct3::REM => {
                    if b == 0 {
                        a
                    } else if a as i64 == i64::MIN && b as i64 == -1 {
                        0
                    } else {
                        ((a as i64).wrapping_rem(b as i64)) as u64
                    }
                }
                rv64m::funct3::REMU => {
                    if b == 0 {
                        a
                    } else {
                        a % b
                    }
                }
                _ => return Err(Trap::IllegalInstruction(d.raw)),
            };
            self.regs.write(d.rd, val);
            return Ok(());
        }
        let shamt = (b & 0x3F) as u32;
        let val = match d.funct3 {
            funct3::ADD_SUB => {
                if d.funct7 == funct7::SUB {
                    a.wrapping_sub(b)
                } else {
                    a.wrapping_add(b)
                }
            }
            funct3::SLL => a << shamt,
            funct3::SLT => u64::from((a as i64) < (b as i64)),
            funct3::SLTU => u64::from(a < b),
            funct3::XOR => a ^ b,
            funct3::SRL_SRA => {
                if d.funct7 == funct7::SUB {
                    ((a as i64) >> shamt) as u64
                } else {
                    a >> shamt
                }
            }
            funct3::OR => a | b,
            funct3::AND => a & b,
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        };
        self.regs.write(d.rd, val);
        Ok(())
    }

    fn exec_op_reg32(&mut self, d: &Decoded) -> Result<(), Trap> {
        let a = self.regs.read(d.rs1) as u32;
        let b = self.regs.read(d.rs2) as u32;
        if d.funct7 == rv64m::opcodes::M_EXTENSION {
            let val = match d.funct3 {
                rv64m::funct3::MUL => a.wrapping_mul(b),
                rv64m::funct3::DIV => {
                    if b == 0 {
                        u32::MAX
                    } else if a as i32 == i32::MIN && b as i32 == -1 {
                        a
                    } else {
                        ((a as i32).wrapping_div(b as i32)) as u32
                    }
                }
                rv64m::funct3::DIVU => {
                    if b == 0 {
                        u32::MAX
                    } else {
                        a / b
                    }
                }
                rv64m::funct3::REM => {
                    if b == 0 {
                        a
                    } else if a as i32 == i32::MIN && b as i32 == -1 {
                        0
                    } else {
                        ((a as i32).wrapping_rem(b as i32)) as u32
                    }
                }
                rv64m::funct3::REMU => {
                    if b == 0 {
                        a
                    } else {
                        a % b
                    }
                }
                _ => return Err(Trap::IllegalInstruction(d.raw)),
            };
            self.regs.write(d.rd, (val as i32) as u64);
            return Ok(());
        }
        let shamt = b & 0x1F;
        let val = match d.funct3 {
            funct3::ADD_SUB => {
                if d.funct7 == funct7::SUB {
                    a.wrapping_sub(b)
                } else {
                    a.wrapping_add(b)
                }
            }
            funct3::SLL => a << shamt,
            funct3::SRL_SRA => {
                if d.funct7 == funct7::SUB {
                    ((a as i32) >> shamt) as u32
                } else {
                    a >> shamt
                }
            }
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        };
        self.regs.write(d.rd, (val as i32) as u64);
        Ok(())
    }

    /// Translates, tag-checks, cache-accounts, and performs the raw transfer
    /// for one load/store. Returns the physical address on success so the
    /// caller can decide whether a coherence scan is warranted.
    fn memory_access(
        &mut self,
        vaddr: u64,
        access: AccessType,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        l2: &mut L2,
        dram: &mut DramBankModel,
        eff: &mut StepEffects,
    ) -> Result<(u64, bool), Trap> {
        let tr = self.mmu.translate(VirtAddr::new(vaddr), access, self.enclave_id, bus, tag_dir);
        if let Some(trap) = tr.trap {
            return Err(trap);
        }
        let paddr = tr.paddr.val();
        let is_write = access == AccessType::Write;
        let (outcome, soft_miss, dram_hit) = self.cache.access(l2, dram, self.enclave_id, paddr, is_write);
        self.account_outcome(outcome, soft_miss);
        eff.l1d_hit = Some(outcome == HierarchyOutcome::Hit);
        if outcome != HierarchyOutcome::Hit {
            eff.l2_hit = Some(outcome == HierarchyOutcome::MissHit);
        }
        if dram_hit.is_some() {
            eff.dram_bank_hit = dram_hit;
        }
        eff.rmt_soft_miss |= soft_miss;
        Ok((paddr, outcome != HierarchyOutcome::Hit))
    }

    fn exec_load(
        &mut self,
        d: &Decoded,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        l2: &mut L2,
        dram: &mut DramBankModel,
        num_slots: usize,
        eff: &mut StepEffects,
    ) -> Result<(), Trap> {
        let vaddr = self.regs.read(d.rs1).wrapping_add(d.imm as u64);
        let width: u64 = match d.funct3 {
            funct3::LB | funct3::LBU => 1,
            funct3::LH | funct3::LHU => 2,
            funct3::LW | funct3::LWU => 4,
            funct3::LD => 8,
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        };
        let (paddr, needs_coherence) = self.memory_access(vaddr, AccessType::Read, bus, tag_dir, l2, dram, eff)?;
        if needs_coherence && paddr >= crate::common::constants::DRAM_BASE {
            eff.coherence_check = Some(paddr);
        }
        let raw = self.mem_read(bus, tag_dir, paddr, width, num_slots);
        let val = match d.funct3 {
            funct3::LB => (raw as i8) as i64 as u64,
            funct3::LH => (raw as i16) as i64 as u64,
            funct3::LW => (raw as i32) as i64 as u64,
            funct3::LD | funct3::LBU | funct3::LHU | funct3::LWU => raw,
            _ => unreachable!(),
        };
        self.regs.write(d.rd, val);
        Ok(())
    }

    fn exec_store(
        &mut self,
        d: &Decoded,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        l2: &mut L2,
        dram: &mut DramBankModel,
        num_slots: usize,
        eff: &mut StepEffects,
    ) -> Result<(), Trap> {
        let vaddr = self.regs.read(d.rs1).wrapping_add(d.imm as u64);
        let width: u64 = match d.funct3 {
            funct3::SB => 1,
            funct3::SH => 2,
            funct3::SW => 4,
            funct3::SD => 8,
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        };
        let (paddr, _) = self.memory_access(vaddr, AccessType::Write, bus, tag_dir, l2, dram, eff)?;
        let value = self.regs.read(d.rs2);
        if self.mem_write(bus, tag_dir, paddr, width, value, num_slots)? {
            eff.flush_tlbs = true;
        }
        Ok(())
    }

    fn exec_amo(
        &mut self,
        d: &Decoded,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        l2: &mut L2,
        dram: &mut DramBankModel,
        num_slots: usize,
        eff: &mut StepEffects,
    ) -> Result<(), Trap> {
        let funct5 = d.funct7 >> 2;
        let width: u64 = if d.funct3 == rv64a::funct3::WIDTH_64 { 8 } else { 4 };
        let addr = self.regs.read(d.rs1);

        if funct5 == rv64a::funct5::LR {
            let (paddr, _) = self.memory_access(addr, AccessType::Read, bus, tag_dir, l2, dram, eff)?;
            let raw = self.mem_read(bus, tag_dir, paddr, width, num_slots);
            self.reservation = Some(paddr);
            let val = if width == 4 { (raw as i32) as i64 as u64 } else { raw };
            self.regs.write(d.rd, val);
            return Ok(());
        }

        let (paddr, _) = self.memory_access(addr, AccessType::Write, bus, tag_dir, l2, dram, eff)?;

        if funct5 == rv64a::funct5::SC {
            let success = self.reservation == Some(paddr);
            self.reservation = None;
            if success {
                let value = self.regs.read(d.rs2);
                if self.mem_write(bus, tag_dir, paddr, width, value, num_slots)? {
                    eff.flush_tlbs = true;
                }
            }
            self.regs.write(d.rd, u64::from(!success));
            return Ok(());
        }

        let old_raw = self.mem_read(bus, tag_dir, paddr, width, num_slots);
        let old = if width == 4 { (old_raw as i32) as i64 as u64 } else { old_raw };
        let rhs = self.regs.read(d.rs2);
        let new = match funct5 {
            rv64a::funct5::AMOSWAP => rhs,
            rv64a::funct5::AMOADD => old.wrapping_add(rhs),
            rv64a::funct5::AMOXOR => old ^ rhs,
            rv64a::funct5::AMOAND => old & rhs,
            rv64a::funct5::AMOOR => old | rhs,
            rv64a::funct5::AMOMIN => {
                if (old as i64) < (rhs as i64) { old } else { rhs }
            }
            rv64a::funct5::AMOMAX => {
                if (old as i64) > (rhs as i64) { old } else { rhs }
            }
            rv64a::funct5::AMOMINU => if old < rhs { old } else { rhs },
            rv64a::funct5::AMOMAXU => if old > rhs { old } else { rhs },
            _ => return Err(Trap::IllegalInstruction(d.raw)),
        };
        if self.mem_write(bus, tag_dir, paddr, width, new, num_slots)? {
            eff.flush_tlbs = true;
        }
        self.regs.write(d.rd, old);
        Ok(())
    }

    fn exec_system(
        &mut self,
        d: &Decoded,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        num_slots: usize,
        eff: &mut StepEffects,
    ) -> Result<(), Trap> {
        if d.funct3 == privileged::funct3::PRIV {
            return match d.imm as u32 {
                privileged::priv_imm::ECALL => Err(Trap::EnvironmentCallFromMMode),
                privileged::priv_imm::EBREAK => Err(Trap::Breakpoint(self.pc)),
                _ => Err(Trap::IllegalInstruction(d.raw)),
            };
        }

        let write_val = match d.funct3 {
            privileged::funct3::CSRRW | privileged::funct3::CSRRS | privileged::funct3::CSRRC => {
                Some(self.regs.read(d.rs1))
            }
            privileged::funct3::CSRRWI
            | privileged::funct3::CSRRSI
            | privileged::funct3::CSRRCI => Some(d.rs1 as u64),
            _ => None,
        };
        let Some(value) = write_val else {
            return Err(Trap::IllegalInstruction(d.raw));
        };
        let is_write_form = matches!(
            d.funct3,
            privileged::funct3::CSRRW | privileged::funct3::CSRRWI
        );

        let csr_addr = d.raw.csr();
        let old = self.read_csr(csr_addr, bus, num_slots);
        if d.rd != 0 {
            self.regs.write(d.rd, old);
        }
        if is_write_form || d.rs1 != 0 {
            self.write_csr(csr_addr, value, bus, tag_dir, num_slots, eff)?;
        }
        Ok(())
    }

    fn read_csr(&mut self, addr: u32, bus: &mut Bus, num_slots: usize) -> u64 {
        match addr {
            csr::GET_MAILBOX_BASE_FOR_SENDER => Self::slot_base(self.index),
            csr::GET_ENCLAVE_ID => self.enclave_id.raw(),
            csr::LLC_MISS_COUNT => self.llc_miss_count,
            csr::RECEIVE_MESSAGE => self.receive_message(bus, num_slots),
            _ => 0,
        }
    }

    fn write_csr(
        &mut self,
        addr: u32,
        value: u64,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        num_slots: usize,
        eff: &mut StepEffects,
    ) -> Result<(), Trap> {
        match addr {
            csr::BARE_METAL_CHAR_OUT => eff.char_out = Some(value as u8),
            csr::BARE_METAL_HALT => {
                self.halted = true;
                eff.halt_requested = true;
            }
            csr::SET_ARGUMENT_ID => self.argument_id = EnclaveId(value),
            csr::ASSIGN_READER => {
                let Some(page) = tag_dir.page_of(value) else {
                    return Err(Trap::StoreAccessFault(value));
                };
                if tag_dir.get(page).owner != self.enclave_id {
                    return Err(Trap::StoreAccessFault(value));
                }
                tag_dir.set_reader(page, self.argument_id);
                eff.flush_tlbs = true;
            }
            csr::DONATE_PAGE => {
                Self::post_message(
                    bus,
                    self.index,
                    self.enclave_id,
                    MessageType::DonatePage,
                    EnclaveId::MANAGEMENT,
                    value,
                );
            }
            csr::CHANGE_PAGE_TAG => {
                if self.enclave_id != EnclaveId::MANAGEMENT {
                    return Err(Trap::StoreAccessFault(value));
                }
                let Some(page) = tag_dir.page_of(value) else {
                    return Err(Trap::StoreAccessFault(value));
                };
                tag_dir.set_owner(page, self.argument_id);
                eff.flush_tlbs = true;
            }
            csr::SEND_MESSAGE => {
                let msg_type = MessageType::from_u32((value >> 56) as u32);
                let content = value & 0x00FF_FFFF_FFFF_FFFF;
                Self::post_message(
                    bus,
                    self.index,
                    self.enclave_id,
                    msg_type,
                    EnclaveId::MANAGEMENT,
                    content,
                );
            }
            csr::MANAGE_CHANGE_ENCLAVE_ID => {
                if self.pc >= MANAGEMENT_ENCLAVE_BASE
                    && self.pc < MANAGEMENT_ENCLAVE_BASE + MANAGEMENT_ENCLAVE_SIZE
                {
                    self.enclave_id = EnclaveId(value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// `RECEIVE_MESSAGE`: scans every mailbox slot for the first message
    /// addressed to this core's current enclave id, consumes it, stashes its
    /// source as the new argument id, and returns its content (0 if none).
    fn receive_message(&mut self, bus: &mut Bus, num_slots: usize) -> u64 {
        for slot in 0..num_slots {
            let msg = Self::read_message_slot(bus, slot);
            if msg.msg_type == MessageType::Invalid || msg.destination != self.enclave_id {
                continue;
            }
            Self::write_message_type(bus, slot, MessageType::Invalid);
            self.argument_id = msg.source;
            return msg.content;
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::{DEFAULT_TLB_ENTRIES, DRAM_BASE};
    use crate::core::units::cache::set_assoc::SetAssocCache;

    fn harness() -> (Cpu, Bus, TagDirectory, L2, DramBankModel) {
        let mut bus = Bus::new(8, 0);
        bus.add_device(Box::new(crate::soc::memory::Memory::new(
            std::sync::Arc::new(crate::soc::memory::buffer::DramBuffer::new(1 << 20)),
            DRAM_BASE,
        )));
        let tag_dir = TagDirectory::new(
            256,
            crate::common::PhysAddr::new(TAGDIRECTORY_BASE),
            DRAM_BASE,
            PAGE_SHIFT,
        );
        let cpu = Cpu::new(0, DRAM_BASE, EnclaveId::DEFAULT, DEFAULT_TLB_ENTRIES, 8, 2, 64, 8, 2, 64, false);
        let l2 = L2::None(SetAssocCache::new(64, 4, 64, 7));
        let dram = DramBankModel::new(8, 2048);
        (cpu, bus, tag_dir, l2, dram)
    }

    #[test]
    fn addi_writes_register() {
        let (mut cpu, mut bus, mut tag_dir, mut l2, mut dram) = harness();
        // addi x1, x0, 5
        let inst: u32 = (5 << 20) | (0 << 15) | (funct3::ADD_SUB << 12) | (1 << 7) | opcodes::OP_IMM;
        bus.write_u32(DRAM_BASE, inst);
        let eff = cpu.step(&mut bus, &mut tag_dir, &mut l2, &mut dram, 1);
        assert!(!eff.trapped);
        assert_eq!(cpu.regs.read(1), 5);
        assert_eq!(cpu.pc, DRAM_BASE + 4);
    }

    #[test]
    fn store_then_load_round_trips() {
        let (mut cpu, mut bus, mut tag_dir, mut l2, mut dram) = harness();
        cpu.regs.write(1, 0xAB);
        cpu.regs.write(2, DRAM_BASE + 0x100);
        // sb x1, 0(x2)
        let store: u32 = (0 << 25) | (1 << 20) | (2 << 15) | (funct3::SB << 12) | (0 << 7) | opcodes::OP_STORE;
        bus.write_u32(DRAM_BASE, store);
        cpu.step(&mut bus, &mut tag_dir, &mut l2, &mut dram, 1);

        // lbu x3, 0(x2)
        let load: u32 = (0 << 20) | (2 << 15) | (funct3::LBU << 12) | (3 << 7) | opcodes::OP_LOAD;
        bus.write_u32(DRAM_BASE + 4, load);
        cpu.step(&mut bus, &mut tag_dir, &mut l2, &mut dram, 1);
        assert_eq!(cpu.regs.read(3), 0xAB);
    }

    #[test]
    fn store_to_foreign_owned_page_faults() {
        let (mut cpu, mut bus, mut tag_dir, mut l2, mut dram) = harness();
        let page = tag_dir.page_of(DRAM_BASE + 0x2000).unwrap();
        tag_dir.set_owner(page, EnclaveId(7));
        cpu.regs.write(2, DRAM_BASE + 0x2000);
        let store: u32 = (0 << 25) | (0 << 20) | (2 << 15) | (funct3::SB << 12) | (0 << 7) | opcodes::OP_STORE;
        bus.write_u32(DRAM_BASE, store);
        let eff = cpu.step(&mut bus, &mut tag_dir, &mut l2, &mut dram, 1);
        assert!(eff.trapped);
        assert!(matches!(cpu.last_trap, Some(Trap::StoreAccessFault(_))));
    }

    #[test]
    fn mailbox_store_stamps_issuer_as_source_regardless_of_payload() {
        let (mut cpu, mut bus, mut tag_dir, mut l2, mut dram) = harness();
        cpu.enclave_id = EnclaveId(3);
        // Try to write a spoofed source by storing straight into the slot's
        // source field; the hardware must overwrite it anyway.
        let addr = MAILBOX_BASE + 8;
        let r = cpu.mem_write(&mut bus, &mut tag_dir, addr, 8, EnclaveId::MANAGEMENT.raw(), 4);
        assert!(r.is_ok());
        let msg = Cpu::read_message_slot(&mut bus, 0);
        assert_eq!(msg.source, EnclaveId(3));
        let _ = (&mut l2, &mut dram);
    }

    #[test]
    fn mailbox_read_of_type_field_consumes_matching_destination() {
        let (cpu, mut bus, _tag_dir, _l2, _dram) = harness();
        Cpu::post_message(&mut bus, 0, EnclaveId::DEFAULT, MessageType::CreateEnclave, EnclaveId::DEFAULT, 42);
        let mut cpu2 = cpu;
        let addr = MAILBOX_BASE;
        let val1 = cpu2.mem_read(&mut bus, &_tag_dir, addr, 4, 1);
        assert_eq!(val1, MessageType::CreateEnclave as u32 as u64);
        let val2 = cpu2.mem_read(&mut bus, &_tag_dir, addr, 4, 1);
        assert_eq!(val2, MessageType::Invalid as u32 as u64);
    }
}
