//! Management shim: the enclave create/donate/switch state machine.
//!
//! The real system loads a precompiled management binary into a fixed code
//! region and runs it as ordinary (if privileged) RISC-V code polling the
//! `receive-message` CSR. That binary is an external artifact this simulator
//! does not have (see crate docs: the management binary is consumed as a
//! primitive, like the ISA decoder). [`ManagementShim::step`] models its
//! observable behavior directly: each driver quantum, it scans the mailbox for
//! a message addressed to `MANAGEMENT` and applies the corresponding state
//! transition. This is the same re-architecting the design notes call for
//! elsewhere (virtual dispatch as an explicit sum type) applied to "the shim's
//! program" as a whole.
//!
//! `DELETE_ENCLAVE`, `ATTEST`, `ACQUIRE_PHYS_CAP`, and `INTER_ENCLAVE` are
//! reserved upstream (`TODO` in the source); they get a defined, minimal reply
//! here rather than invented semantics.

use crate::core::enclave::ids::{EnclaveId, EnclaveIdAllocator};
use crate::core::enclave::message::{Message, MessageType};
use crate::core::enclave::record::EnclaveRecord;
use crate::core::enclave::tag_directory::TagDirectory;
use crate::soc::interconnect::Bus;

/// A request, produced by the shim, to dispatch a core into an enclave
/// context. Applied by the driver, which owns the core table.
#[derive(Clone, Copy, Debug)]
pub struct SwitchRequest {
    /// Physical core index to dispatch.
    pub target_core: usize,
    /// Enclave id the core should run as.
    pub enclave_id: EnclaveId,
    /// Program counter to resume/enter at.
    pub entry_pc: u64,
}

/// State owned by the management shim across steps.
pub struct ManagementShim {
    /// Enclave id stashed by the most recent `SET_ARGUMENT`, consumed by the
    /// following `DONATE_PAGE`/`SWITCH_ENCLAVE`.
    argument: EnclaveId,
    id_alloc: EnclaveIdAllocator,
    mailbox_base: u64,
    num_slots: usize,
}

impl ManagementShim {
    /// Creates a shim bound to a mailbox of `num_slots` slots starting at
    /// `mailbox_base`.
    #[must_use]
    pub const fn new(mailbox_base: u64, num_slots: usize) -> Self {
        Self {
            argument: EnclaveId::INVALID,
            id_alloc: EnclaveIdAllocator::new(),
            mailbox_base,
            num_slots,
        }
    }

    fn slot_addr(&self, idx: usize) -> u64 {
        self.mailbox_base + idx as u64 * crate::core::enclave::message::MESSAGE_SIZE
    }

    fn read_slot(&self, bus: &mut Bus, idx: usize) -> Message {
        let addr = self.slot_addr(idx);
        let mut buf = [0u8; 32];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = bus.read_u8(addr + i as u64);
        }
        Message::decode(&buf)
    }

    /// Writes `msg` directly into `core_index`'s slot, bypassing the
    /// issuer-redirect and source-stamping rules that apply to ordinary cores
    /// (the shim is privileged and replies on behalf of whichever enclave it
    /// is acting as).
    fn write_slot(&self, bus: &mut Bus, core_index: usize, msg: &Message) {
        let addr = self.slot_addr(core_index);
        let bytes = msg.encode();
        for (i, b) in bytes.iter().enumerate() {
            bus.write_u8(addr + i as u64, *b);
        }
    }

    fn consume_slot(&self, bus: &mut Bus, idx: usize) {
        let addr = self.slot_addr(idx);
        for (i, b) in (MessageType::Invalid as u32).to_le_bytes().iter().enumerate() {
            bus.write_u8(addr + i as u64, *b);
        }
    }

    fn reply(&self, bus: &mut Bus, to_core: usize, msg_type: MessageType, content: u64) {
        let msg = Message {
            msg_type,
            source: EnclaveId::MANAGEMENT,
            destination: EnclaveId::DEFAULT, // overwritten by hardware on the recipient's next store; informational only
            content,
        };
        self.write_slot(bus, to_core, &msg);
    }

    /// Scans the mailbox for a message addressed to `MANAGEMENT`, processes at
    /// most one per call (oldest slot index first), and returns any core
    /// dispatch request produced by a `SWITCH_ENCLAVE`.
    pub fn step(
        &mut self,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        enclaves: &mut Vec<EnclaveRecord>,
    ) -> Option<SwitchRequest> {
        for slot in 0..self.num_slots {
            let msg = self.read_slot(bus, slot);
            if msg.msg_type == MessageType::Invalid || msg.destination != EnclaveId::MANAGEMENT {
                continue;
            }
            self.consume_slot(bus, slot);
            return self.handle(bus, tag_dir, enclaves, slot, msg);
        }
        None
    }

    fn handle(
        &mut self,
        bus: &mut Bus,
        tag_dir: &mut TagDirectory,
        enclaves: &mut Vec<EnclaveRecord>,
        from_core: usize,
        msg: Message,
    ) -> Option<SwitchRequest> {
        match msg.msg_type {
            MessageType::CreateEnclave => {
                let id = self.id_alloc.allocate();
                enclaves.push(EnclaveRecord::new(id));
                self.reply(bus, from_core, MessageType::CreateEnclave, id.raw());
                None
            }
            MessageType::SetArgument => {
                self.argument = EnclaveId(msg.content);
                self.reply(bus, from_core, MessageType::SetArgument, 1);
                None
            }
            MessageType::DonatePage => {
                let ok = self.donate_page(tag_dir, enclaves, msg.source, msg.content);
                self.reply(bus, from_core, MessageType::DonatePage, u64::from(ok));
                None
            }
            MessageType::SwitchEnclave => {
                let req = self.switch_enclave(enclaves, msg.content as usize);
                let ok = req.is_some();
                self.reply(bus, from_core, MessageType::SwitchEnclave, u64::from(ok));
                req
            }
            MessageType::DeleteEnclave
            | MessageType::Attest
            | MessageType::AcquirePhysCap
            | MessageType::InterEnclave => {
                // Reserved; the source left these as TODO. Minimal ack, no state change.
                self.reply(bus, from_core, msg.msg_type, 0);
                None
            }
            MessageType::Invalid => None,
        }
    }

    /// Returns `true` on success, `false` on failure: the argument enclave
    /// must exist and still accept donations, and `donor` must currently own
    /// the page at `addr` (you can only donate what you own).
    fn donate_page(
        &self,
        tag_dir: &mut TagDirectory,
        enclaves: &mut [EnclaveRecord],
        donor: EnclaveId,
        addr: u64,
    ) -> bool {
        let Some(page) = tag_dir.page_of(addr) else {
            return false;
        };
        if tag_dir.get(page).owner != donor {
            return false;
        }
        let Some(record) = enclaves.iter_mut().find(|e| e.id == self.argument) else {
            return false;
        };
        if !record.accepts_donations() {
            return false;
        }
        if !record.donate(addr) {
            return false;
        }
        tag_dir.set_owner(page, self.argument);
        true
    }

    fn switch_enclave(
        &self,
        enclaves: &mut [EnclaveRecord],
        target_core: usize,
    ) -> Option<SwitchRequest> {
        let record = enclaves.iter_mut().find(|e| e.id == self.argument)?;
        record.switch(target_core);
        Some(SwitchRequest {
            target_core,
            enclave_id: self.argument,
            entry_pc: record.code_entry_address,
        })
    }
}
