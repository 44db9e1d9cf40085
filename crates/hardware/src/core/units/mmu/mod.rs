//! Memory Management Unit: virtual-to-physical translation fused with the
//! tag-isolation check.
//!
//! Every fetch/load/store goes through [`Mmu::translate`], which (a) resolves
//! the physical address — identity when the root pointer is zero ("bare"
//! mode, the common case for this bare-metal target), otherwise via the page
//! table walker — and (b) if the resulting page is backed by tagged DRAM,
//! enforces the owner/reader discipline: fetches and stores require
//! `issuer == tag.owner`; loads additionally allow `issuer == tag.reader`.
//! Pages outside DRAM (ROM, the mailbox, the tag directory itself) carry no
//! tag and are not access-checked here.

/// Generic multi-level page table walker.
pub mod ptw;

/// Tag-aware translation lookaside buffer.
pub mod tlb;

use crate::common::constants::PAGE_SHIFT;
use crate::common::{AccessType, PhysAddr, TranslationResult, Trap, VirtAddr};
use crate::core::enclave::{EnclaveId, TagDirectory};
use crate::soc::interconnect::Bus;

use self::tlb::Tlb;

/// Mask for a 44-bit physical page number (enough for this simulator's address space).
pub const PPN_MASK: u64 = (1 << 44) - 1;

/// Memory management unit for one core.
pub struct Mmu {
    /// Instruction-fetch TLB.
    pub itlb: Tlb,
    /// Load/store TLB.
    pub dtlb: Tlb,
    /// Root page table physical page number. Zero means bare (identity) mode.
    pub root_ppn: u64,
}

impl Mmu {
    /// Creates an MMU with `tlb_size`-entry TLBs, starting in bare mode.
    #[must_use]
    pub fn new(tlb_size: usize) -> Self {
        Self {
            itlb: Tlb::new(tlb_size),
            dtlb: Tlb::new(tlb_size),
            root_ppn: 0,
        }
    }

    /// Invalidates both TLBs. Called on any tag directory mutation and on a
    /// root-pointer change, so a cached tag is never stale while live.
    pub fn flush_all(&mut self) {
        self.itlb.flush();
        self.dtlb.flush();
    }

    /// Translates `vaddr` and checks the owner/reader tag discipline for
    /// `issuer`. Pages not backed by tagged DRAM (`tag_dir.page_of` returns
    /// `None`) translate without a tag check.
    pub fn translate(
        &mut self,
        vaddr: VirtAddr,
        access: AccessType,
        issuer: EnclaveId,
        bus: &mut Bus,
        tag_dir: &TagDirectory,
    ) -> TranslationResult {
        let vpn = vaddr.val() >> PAGE_SHIFT;
        let tlb = if access == AccessType::Fetch {
            &mut self.itlb
        } else {
            &mut self.dtlb
        };

        if let Some((ppn, owner, reader)) = tlb.lookup(vpn) {
            let paddr = (ppn << PAGE_SHIFT) | vaddr.page_offset();
            if let Some(fault) = check_tag(owner, reader, issuer, access, vaddr.val()) {
                return TranslationResult::fault(fault, 0);
            }
            return TranslationResult::success(PhysAddr::new(paddr), 0);
        }

        let walked = if self.root_ppn == 0 {
            TranslationResult::success(PhysAddr::new(vaddr.val()), 0)
        } else {
            ptw::walk(self.root_ppn, vaddr, access, bus)
        };
        let Some(trap) = &walked.trap else {
            let paddr = walked.paddr.val();
            if let Some(page) = tag_dir.page_of(paddr) {
                let tag = tag_dir.get(page);
                if let Some(fault) = check_tag(tag.owner, tag.reader, issuer, access, vaddr.val())
                {
                    return TranslationResult::fault(fault, walked.cycles);
                }
                let ppn = paddr >> PAGE_SHIFT;
                let tlb = if access == AccessType::Fetch {
                    &mut self.itlb
                } else {
                    &mut self.dtlb
                };
                tlb.insert(vpn, ppn, tag.owner, tag.reader);
            }
            return walked;
        };
        let _ = trap;
        walked
    }
}

fn check_tag(
    owner: EnclaveId,
    reader: EnclaveId,
    issuer: EnclaveId,
    access: AccessType,
    vaddr: u64,
) -> Option<Trap> {
    let allowed = match access {
        AccessType::Fetch => issuer == owner,
        AccessType::Write => issuer == owner,
        AccessType::Read => issuer == owner || issuer == reader,
    };
    if allowed {
        None
    } else {
        Some(match access {
            AccessType::Fetch => Trap::InstructionAccessFault(vaddr),
            AccessType::Read => Trap::LoadAccessFault(vaddr),
            AccessType::Write => Trap::StoreAccessFault(vaddr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Invariant 1: a load succeeds iff the issuer is the page's owner or reader.
        #[test]
        fn load_allowed_iff_owner_or_reader(owner in 0u64..6, reader in 0u64..6, issuer in 0u64..6) {
            let (owner, reader, issuer) = (EnclaveId(owner), EnclaveId(reader), EnclaveId(issuer));
            let fault = check_tag(owner, reader, issuer, AccessType::Read, 0x1000);
            prop_assert_eq!(fault.is_none(), issuer == owner || issuer == reader);
            if let Some(f) = fault {
                prop_assert!(matches!(f, Trap::LoadAccessFault(_)));
            }
        }

        /// Invariant 2: a store or fetch succeeds iff the issuer owns the page.
        #[test]
        fn store_and_fetch_allowed_iff_owner(
            owner in 0u64..6,
            reader in 0u64..6,
            issuer in 0u64..6,
            is_store in any::<bool>(),
        ) {
            let (owner, reader, issuer) = (EnclaveId(owner), EnclaveId(reader), EnclaveId(issuer));
            let access = if is_store { AccessType::Write } else { AccessType::Fetch };
            let fault = check_tag(owner, reader, issuer, access, 0x1000);
            prop_assert_eq!(fault.is_none(), issuer == owner);
            if let Some(f) = fault {
                let expected_kind = if is_store {
                    matches!(f, Trap::StoreAccessFault(_))
                } else {
                    matches!(f, Trap::InstructionAccessFault(_))
                };
                prop_assert!(expected_kind);
            }
        }

        /// Invariant 3: a reader-only store (reader == issuer != owner) always faults.
        #[test]
        fn reader_only_store_always_faults(owner in 0u64..6, issuer in 1u64..7) {
            let owner = EnclaveId(owner);
            let issuer = EnclaveId(issuer);
            prop_assume!(issuer != owner);
            let fault = check_tag(owner, issuer, issuer, AccessType::Write, 0x2000);
            prop_assert!(matches!(fault, Some(Trap::StoreAccessFault(_))));
        }
    }
}
