//! Static LLC partitioning: each enclave gets a dedicated slice of the L2's
//! sets, the default (non-enclave) context getting half and every other
//! enclave getting half of what's left (a quarter of the total).

use std::collections::HashMap;

use super::set_assoc::{Outcome, SetAssocCache};
use crate::core::enclave::EnclaveId;

/// A statically-partitioned L2: one [`SetAssocCache`] per distinct enclave id
/// observed, each sized to that enclave's share of the total sets.
pub struct StaticPartitioned {
    total_sets: usize,
    ways: usize,
    line_bytes: usize,
    slices: HashMap<EnclaveId, SetAssocCache>,
}

impl StaticPartitioned {
    /// Creates a static-partitioning L2 of `total_sets x ways x line_bytes`.
    #[must_use]
    pub fn new(total_sets: usize, ways: usize, line_bytes: usize) -> Self {
        Self {
            total_sets: total_sets.max(1),
            ways: ways.max(1),
            line_bytes: line_bytes.max(8),
            slices: HashMap::new(),
        }
    }

    fn share_for(&self, enclave: EnclaveId) -> usize {
        let half = (self.total_sets / 2).max(1);
        if enclave == EnclaveId::DEFAULT {
            half
        } else {
            let rest = self.total_sets - half;
            (rest / 2).max(1)
        }
    }

    /// Accesses `addr` on behalf of `enclave`, lazily creating its slice.
    pub fn access(&mut self, enclave: EnclaveId, addr: u64, is_write: bool) -> (Outcome, Option<u64>) {
        let sets = self.share_for(enclave);
        let ways = self.ways;
        let line_bytes = self.line_bytes;
        let slice = self
            .slices
            .entry(enclave)
            .or_insert_with(|| SetAssocCache::new(sets, ways, line_bytes, enclave.raw() as u16));
        slice.access(addr, is_write)
    }

    /// Number of sets in `enclave`'s slice (for tests and statistics).
    #[must_use]
    pub fn sets_for(&self, enclave: EnclaveId) -> usize {
        self.share_for(enclave)
    }
}

#[cfg(test)]
mod tests {
    use super::StaticPartitioned;
    use crate::core::enclave::EnclaveId;

    #[test]
    fn default_gets_half_the_sets_everyone_else_splits_the_rest() {
        let parts = StaticPartitioned::new(64, 4, 64);
        assert_eq!(parts.sets_for(EnclaveId::DEFAULT), 32);
        assert_eq!(parts.sets_for(EnclaveId(1)), 16);
        assert_eq!(parts.sets_for(EnclaveId(2)), 16);
    }

    #[test]
    fn an_odd_total_still_leaves_each_share_at_least_one_set() {
        let parts = StaticPartitioned::new(1, 4, 64);
        assert_eq!(parts.sets_for(EnclaveId::DEFAULT), 1);
        assert_eq!(parts.sets_for(EnclaveId(1)), 1);
    }

    #[test]
    fn an_enclaves_slice_is_isolated_from_defaults() {
        let mut parts = StaticPartitioned::new(2, 1, 64);
        // One set per slice; installing a line for DEFAULT must not be
        // visible to enclave 1's disjoint slice.
        let (outcome, _) = parts.access(EnclaveId::DEFAULT, 0x1000, false);
        assert_eq!(outcome, super::Outcome::Miss);
        let (outcome, _) = parts.access(EnclaveId(1), 0x1000, false);
        assert_eq!(outcome, super::Outcome::Miss);
    }
}
