//! Translation Lookaside Buffer (TLB), extended to cache the owning page's
//! `(owner, reader)` tag alongside the translation.
//!
//! Caching the tag here (instead of re-reading the tag directory on every
//! hit) is only sound because any tag mutation triggers a global flush of
//! both TLBs (see [`crate::core::units::mmu::Mmu::flush_all`]), so a cached
//! entry is never stale while live.

use crate::core::enclave::EnclaveId;

/// A single entry in the TLB.
#[derive(Clone, Copy)]
struct TlbEntry {
    vpn: u64,
    ppn: u64,
    valid: bool,
    owner: EnclaveId,
    reader: EnclaveId,
}

impl Default for TlbEntry {
    fn default() -> Self {
        Self {
            vpn: 0,
            ppn: 0,
            valid: false,
            owner: EnclaveId::DEFAULT,
            reader: EnclaveId::INVALID,
        }
    }
}

/// A fully-associative-by-masking TLB (direct-mapped by `vpn & mask`, like the
/// upstream instruction/data TLBs this is modeled on).
pub struct Tlb {
    entries: Vec<TlbEntry>,
    mask: usize,
}

impl Tlb {
    /// Creates a new TLB with `size` entries, rounded up to a power of two.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let safe_size = if size.is_power_of_two() {
            size.max(1)
        } else {
            size.next_power_of_two()
        };
        Self {
            entries: vec![TlbEntry::default(); safe_size],
            mask: safe_size - 1,
        }
    }

    /// Looks up `vpn`, returning `(ppn, owner, reader)` on a hit.
    #[must_use]
    pub fn lookup(&self, vpn: u64) -> Option<(u64, EnclaveId, EnclaveId)> {
        let idx = (vpn as usize) & self.mask;
        let entry = &self.entries[idx];
        if entry.valid && entry.vpn == vpn {
            Some((entry.ppn, entry.owner, entry.reader))
        } else {
            None
        }
    }

    /// Inserts/replaces a mapping, caching the tag at fill time.
    pub fn insert(&mut self, vpn: u64, ppn: u64, owner: EnclaveId, reader: EnclaveId) {
        let idx = (vpn as usize) & self.mask;
        self.entries[idx] = TlbEntry {
            vpn,
            ppn,
            valid: true,
            owner,
            reader,
        };
    }

    /// Invalidates every entry. Called on any tag directory mutation and on
    /// a `satp`-equivalent root-pointer change.
    pub fn flush(&mut self) {
        for e in &mut self.entries {
            e.valid = false;
        }
    }
}
