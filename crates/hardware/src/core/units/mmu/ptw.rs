//! Generic multi-level page table walker.
//!
//! Three levels, nine bits of virtual page number per level (the same shape
//! as SV39, minus the permission bits: this system enforces access control
//! entirely through the tag directory, so leaf PTEs here carry only a valid
//! bit and a physical page number). `accessed`/`dirty` bits are always
//! auto-set on a successful walk rather than raising a fault when absent —
//! one of the two policies the design allows, chosen for simplicity.

use crate::common::constants::PAGE_SHIFT;
use crate::common::{AccessType, PhysAddr, TranslationResult, Trap, VirtAddr};
use crate::soc::interconnect::Bus;

const LEVELS: u64 = 3;
const VPN_BITS_PER_LEVEL: u64 = 9;
const VPN_ENTRY_MASK: u64 = 0x1FF;
const PTE_SIZE: u64 = 8;

const PTE_VALID_BIT: u64 = 1;
const PTE_LEAF_BIT: u64 = 1 << 1;
const PTE_ACCESSED_BIT: u64 = 1 << 6;
const PTE_DIRTY_BIT: u64 = 1 << 7;
const PTE_PPN_SHIFT: u64 = 10;

/// Walks the page table rooted at `root_ppn`, returning the translated
/// physical address on success.
pub fn walk(
    root_ppn: u64,
    vaddr: VirtAddr,
    access: AccessType,
    bus: &mut Bus,
) -> TranslationResult {
    let mut ppn = root_ppn;
    let mut cycles = 0;

    for level in (0..LEVELS).rev() {
        let vpn_shift = PAGE_SHIFT + level * VPN_BITS_PER_LEVEL;
        let vpn_i = (vaddr.val() >> vpn_shift) & VPN_ENTRY_MASK;
        let pte_addr = (ppn << PAGE_SHIFT) + vpn_i * PTE_SIZE;

        cycles += bus.calculate_transit_time(8);
        let pte = bus.read_u64(pte_addr);

        if pte & PTE_VALID_BIT == 0 {
            return TranslationResult::fault(page_fault(vaddr.val(), access), cycles);
        }

        let is_leaf = pte & PTE_LEAF_BIT != 0;
        if !is_leaf {
            if level == 0 {
                return TranslationResult::fault(page_fault(vaddr.val(), access), cycles);
            }
            ppn = (pte >> PTE_PPN_SHIFT) & crate::core::units::mmu::PPN_MASK;
            continue;
        }

        let mut new_pte = pte;
        let mut dirty = false;
        if pte & PTE_ACCESSED_BIT == 0 {
            new_pte |= PTE_ACCESSED_BIT;
            dirty = true;
        }
        if access == AccessType::Write && pte & PTE_DIRTY_BIT == 0 {
            new_pte |= PTE_DIRTY_BIT;
            dirty = true;
        }
        if dirty {
            bus.write_u64(pte_addr, new_pte);
        }

        let leaf_ppn = (new_pte >> PTE_PPN_SHIFT) & crate::core::units::mmu::PPN_MASK;
        let offset_mask = (1u64 << vpn_shift) - 1;
        let paddr = (leaf_ppn << PAGE_SHIFT) | (vaddr.val() & offset_mask);
        return TranslationResult::success(PhysAddr::new(paddr), cycles);
    }

    TranslationResult::fault(page_fault(vaddr.val(), access), cycles)
}

fn page_fault(addr: u64, access: AccessType) -> Trap {
    match access {
        AccessType::Fetch => Trap::InstructionPageFault(addr),
        AccessType::Read => Trap::LoadPageFault(addr),
        AccessType::Write => Trap::StorePageFault(addr),
    }
}
