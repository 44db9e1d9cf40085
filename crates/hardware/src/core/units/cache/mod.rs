//! Split L1 instruction/data caches per core, a shared or partitioned L2, and
//! the DRAM-bank row-buffer model below it.
//!
//! The L2 partitioning modes are modeled as an explicit sum type rather than
//! a trait object hierarchy, per the design notes' guidance on the source's
//! virtual-dispatch cache classes: `L2::{None, Rmt, Static}`, with the
//! partitioning logic as a match over the discriminant.

/// DRAM-bank row-buffer model (covert-channel analysis).
pub mod dram_bank;

/// Linear-feedback shift register used for replacement and RMT slot draws.
pub mod lfsr;

/// Remapping-table LLC partitioning.
pub mod rmt;

/// Set-associative cache line storage (L1s and static-partition slices).
pub mod set_assoc;

/// Static per-enclave LLC set partitioning.
pub mod static_part;

use crate::core::enclave::EnclaveId;
pub use set_assoc::{Outcome, SetAssocCache};

use dram_bank::DramBankModel;
use rmt::{RmtCache, RmtOutcome};
use static_part::StaticPartitioned;

/// Combined hit/miss outcome of one access through the L1 -> L2 hierarchy,
/// matching the four outcomes the design calls for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HierarchyOutcome {
    /// Hit in L1.
    Hit,
    /// Miss in L1, hit in L2.
    MissHit,
    /// Miss in L1, miss in L2.
    MissMiss,
}

/// The shared (or partitioned) L2, modeled as a tagged union over the
/// partitioning mode selected at init.
pub enum L2 {
    /// A single shared LLC; no isolation between enclaves.
    None(SetAssocCache),
    /// Remapping-table partitioning.
    Rmt(RmtCache),
    /// Static set-count partitioning.
    Static(StaticPartitioned),
}

impl L2 {
    /// Accesses the L2 on behalf of `enclave`. Returns whether it was an
    /// ordinary hit/miss, and separately whether it was an RMT soft miss
    /// (hit in the RMT, miss in the backing slot).
    pub fn access(&mut self, enclave: EnclaveId, addr: u64, is_write: bool) -> (Outcome, bool) {
        match self {
            Self::None(cache) => (cache.access(addr, is_write).0, false),
            Self::Rmt(rmt) => match rmt.access(enclave, addr, is_write) {
                RmtOutcome::Hit => (Outcome::Hit, false),
                RmtOutcome::Miss => (Outcome::Miss, false),
                RmtOutcome::SoftMiss => (Outcome::Miss, true),
            },
            Self::Static(parts) => (parts.access(enclave, addr, is_write).0, false),
        }
    }
}

/// Per-core L1 instruction and data caches, backed by a (possibly shared) L2
/// and, below that, the DRAM-bank model.
pub struct CacheHierarchy {
    /// Per-core L1 instruction cache.
    pub l1i: SetAssocCache,
    /// Per-core L1 data cache.
    pub l1d: SetAssocCache,
}

impl CacheHierarchy {
    /// Creates split L1 instruction/data caches, each independently shaped
    /// (per `--ic`/`--dc`).
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        ic_sets: usize,
        ic_ways: usize,
        ic_line_bytes: usize,
        dc_sets: usize,
        dc_ways: usize,
        dc_line_bytes: usize,
        core_index: usize,
    ) -> Self {
        Self {
            l1i: SetAssocCache::new(ic_sets, ic_ways, ic_line_bytes, (core_index as u16) * 2 + 1),
            l1d: SetAssocCache::new(dc_sets, dc_ways, dc_line_bytes, (core_index as u16) * 2 + 2),
        }
    }

    /// Performs a fetch access: only L1I and (possibly partitioned) L2 are
    /// consulted; the DRAM-bank model is load/store only per the design.
    pub fn fetch(&mut self, l2: &mut L2, enclave: EnclaveId, addr: u64) -> (HierarchyOutcome, bool) {
        match self.l1i.access(addr, false).0 {
            Outcome::Hit => (HierarchyOutcome::Hit, false),
            Outcome::Miss => {
                let (l2_outcome, soft_miss) = l2.access(enclave, addr, false);
                let outcome = match l2_outcome {
                    Outcome::Hit => HierarchyOutcome::MissHit,
                    Outcome::Miss => HierarchyOutcome::MissMiss,
                };
                (outcome, soft_miss)
            }
        }
    }

    /// Performs a load/store access, additionally consulting `dram` on an L2
    /// miss. The third element of the tuple is the DRAM-bank row-buffer
    /// outcome, present only when the access reached that far.
    pub fn access(
        &mut self,
        l2: &mut L2,
        dram: &mut DramBankModel,
        enclave: EnclaveId,
        addr: u64,
        is_write: bool,
    ) -> (HierarchyOutcome, bool, Option<bool>) {
        match self.l1d.access(addr, is_write).0 {
            Outcome::Hit => (HierarchyOutcome::Hit, false, None),
            Outcome::Miss => {
                let (l2_outcome, soft_miss) = l2.access(enclave, addr, is_write);
                match l2_outcome {
                    Outcome::Hit => (HierarchyOutcome::MissHit, soft_miss, None),
                    Outcome::Miss => {
                        let row_hit = dram.access(addr);
                        (HierarchyOutcome::MissMiss, soft_miss, Some(row_hit))
                    }
                }
            }
        }
    }

    /// Cross-core coherence fixup: if `writer`'s L1D has a dirty line at
    /// `addr`, write it back and invalidate `reader`'s L1D entry so the
    /// reader's next load observes up-to-date data.
    pub fn coherence_fixup(writer: &mut SetAssocCache, reader: &mut SetAssocCache, addr: u64) {
        if writer.perform_writeback(addr) {
            reader.invalidate_address(addr);
        }
    }
}
