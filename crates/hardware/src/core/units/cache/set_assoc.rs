//! Set-associative cache line storage shared by L1I, L1D, and the static
//! partitioning scheme's per-enclave LLC slices.
//!
//! One-set configurations (the fully-associative case the design calls out:
//! "configurations with one set and more than four ways are implemented as a
//! fully-associative map") fall out of the same code path — a single set
//! searched over all ways.

use super::lfsr::Lfsr;

#[derive(Clone, Copy, Default)]
struct Line {
    tag: u64,
    valid: bool,
    dirty: bool,
}

/// Outcome of accessing one cache level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The line was present.
    Hit,
    /// The line was absent and has now been installed.
    Miss,
}

/// A `(sets x ways x line_bytes)` cache with LFSR-driven replacement.
pub struct SetAssocCache {
    lines: Vec<Line>,
    sets: usize,
    ways: usize,
    line_bytes: usize,
    lfsr: Lfsr,
}

impl SetAssocCache {
    /// Creates a cache. `sets`, `ways`, and `line_bytes` are all clamped to
    /// at least 1 (and `line_bytes` must be a power of two per the design;
    /// callers are expected to have validated the configuration string).
    #[must_use]
    pub fn new(sets: usize, ways: usize, line_bytes: usize, seed: u16) -> Self {
        let sets = sets.max(1);
        let ways = ways.max(1);
        let line_bytes = line_bytes.max(8);
        Self {
            lines: vec![Line::default(); sets * ways],
            sets,
            ways,
            line_bytes,
            lfsr: Lfsr::new(seed),
        }
    }

    /// Number of sets (used by the static-partitioning split).
    #[must_use]
    pub fn sets(&self) -> usize {
        self.sets
    }

    fn index_of(&self, addr: u64) -> (usize, u64) {
        let line_no = addr / self.line_bytes as u64;
        let set_index = (line_no as usize) % self.sets;
        let tag = line_no / self.sets as u64;
        (set_index, tag)
    }

    /// Returns whether `addr`'s line is currently resident.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        let (set, tag) = self.index_of(addr);
        let base = set * self.ways;
        (0..self.ways).any(|w| {
            let l = &self.lines[base + w];
            l.valid && l.tag == tag
        })
    }

    /// Accesses `addr`. Returns the outcome and, on a miss that evicted a
    /// dirty line, the address of the line written back.
    pub fn access(&mut self, addr: u64, is_write: bool) -> (Outcome, Option<u64>) {
        let (set, tag) = self.index_of(addr);
        let base = set * self.ways;
        for w in 0..self.ways {
            let l = &mut self.lines[base + w];
            if l.valid && l.tag == tag {
                if is_write {
                    l.dirty = true;
                }
                return (Outcome::Hit, None);
            }
        }

        let victim_way = self.lfsr.next_bounded(self.ways);
        let victim = &mut self.lines[base + victim_way];
        let writeback = if victim.valid && victim.dirty {
            Some((victim.tag * self.sets as u64 + set as u64) * self.line_bytes as u64)
        } else {
            None
        };
        *victim = Line {
            tag,
            valid: true,
            dirty: is_write,
        };
        (Outcome::Miss, writeback)
    }

    /// Invalidates the line backing `addr`, if present. Returns whether a
    /// (possibly dirty) line was invalidated.
    pub fn invalidate_address(&mut self, addr: u64) -> bool {
        let (set, tag) = self.index_of(addr);
        let base = set * self.ways;
        for w in 0..self.ways {
            let l = &mut self.lines[base + w];
            if l.valid && l.tag == tag {
                *l = Line::default();
                return true;
            }
        }
        false
    }

    /// Writes back the line at `addr` if it is dirty, then clears the dirty
    /// bit. Returns whether a write-back happened (used by the cross-core
    /// coherence fixup).
    pub fn perform_writeback(&mut self, addr: u64) -> bool {
        let (set, tag) = self.index_of(addr);
        let base = set * self.ways;
        for w in 0..self.ways {
            let l = &mut self.lines[base + w];
            if l.valid && l.tag == tag && l.dirty {
                l.dirty = false;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::{Outcome, SetAssocCache};

    #[test]
    fn repeated_access_to_same_line_hits() {
        let mut cache = SetAssocCache::new(4, 2, 64, 1);
        assert_eq!(cache.access(0x1000, false).0, Outcome::Miss);
        assert_eq!(cache.access(0x1000, false).0, Outcome::Hit);
    }

    #[test]
    fn distinct_sets_do_not_evict_each_other() {
        let mut cache = SetAssocCache::new(4, 1, 64, 1);
        for i in 0..4u64 {
            assert_eq!(cache.access(i * 64, false).0, Outcome::Miss);
        }
        for i in 0..4u64 {
            assert_eq!(cache.access(i * 64, false).0, Outcome::Hit);
        }
    }

    #[test]
    fn evicting_a_dirty_line_reports_its_writeback_address() {
        let mut cache = SetAssocCache::new(1, 1, 64, 1);
        let (outcome, wb) = cache.access(0x1000, true);
        assert_eq!(outcome, Outcome::Miss);
        assert_eq!(wb, None);
        let (outcome, wb) = cache.access(0x2000, false);
        assert_eq!(outcome, Outcome::Miss);
        assert_eq!(wb, Some(0x1000));
    }

    #[test]
    fn invalidate_address_clears_a_resident_line_only() {
        let mut cache = SetAssocCache::new(4, 2, 64, 1);
        cache.access(0x1000, false);
        assert!(cache.invalidate_address(0x1000));
        assert!(!cache.contains(0x1000));
        assert!(!cache.invalidate_address(0x1000));
    }

    #[test]
    fn perform_writeback_clears_dirty_without_evicting() {
        let mut cache = SetAssocCache::new(4, 2, 64, 1);
        cache.access(0x1000, true);
        assert!(cache.perform_writeback(0x1000));
        assert!(!cache.perform_writeback(0x1000));
        assert!(cache.contains(0x1000));
    }
}
