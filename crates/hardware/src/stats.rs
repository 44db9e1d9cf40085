//! Simulation statistics: per-core, per-cache-level counters and the
//! optional PC histogram, reported once at halt (see the driver's exit
//! sequence in `sim::simulator`).
//!
//! There is neither a pipeline nor an FPU in this simulator, so what gets
//! reported is instructions retired and traps taken per core, hit/miss
//! counts at each cache level (plus the RMT soft-miss count when
//! partitioning is active), and DRAM-bank row-buffer hit/miss counts.

use std::collections::HashMap;

/// Hit/miss counters for one cache level.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheCounters {
    /// Accesses that hit.
    pub hits: u64,
    /// Accesses that missed.
    pub misses: u64,
}

impl CacheCounters {
    fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    /// Miss rate as a fraction in `[0, 1]`; `0.0` when there were no accesses.
    #[must_use]
    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }
}

/// Per-core statistics: instruction/trap counts and this core's L1 hit/miss
/// history.
#[derive(Clone, Debug, Default)]
pub struct CoreStats {
    /// Instructions retired.
    pub instructions_retired: u64,
    /// Traps taken.
    pub traps_taken: u64,
    /// L1 instruction cache counters.
    pub l1i: CacheCounters,
    /// L1 data cache counters.
    pub l1d: CacheCounters,
    /// Counts of distinct program counters visited, keyed by page (`pc >>
    /// PAGE_SHIFT`) when histogram collection is enabled.
    pub pc_histogram: HashMap<u64, u64>,
}

/// Simulation-wide statistics: one [`CoreStats`] per core plus the shared
/// cache levels below the per-core L1s.
#[derive(Clone, Debug, Default)]
pub struct SimStats {
    /// Per-core counters, indexed by core index.
    pub cores: Vec<CoreStats>,
    /// Shared/partitioned L2 counters (aggregate across enclaves).
    pub l2: CacheCounters,
    /// RMT soft-miss count (hit in the RMT, miss in the shared slot),
    /// meaningful only when partitioning is RMT.
    pub rmt_soft_misses: u64,
    /// DRAM-bank row-buffer counters.
    pub dram_bank: CacheCounters,
    /// Whether PC-histogram collection is enabled (`-g`).
    pub histogram_enabled: bool,
}

impl SimStats {
    /// Creates per-core counters for `num_cores` cores.
    #[must_use]
    pub fn new(num_cores: usize, histogram_enabled: bool) -> Self {
        Self {
            cores: vec![CoreStats::default(); num_cores],
            l2: CacheCounters::default(),
            rmt_soft_misses: 0,
            dram_bank: CacheCounters::default(),
            histogram_enabled,
        }
    }

    /// Records one L1 instruction-cache access for `core`.
    pub fn record_l1i(&mut self, core: usize, hit: bool) {
        self.cores[core].l1i.record(hit);
    }

    /// Records one L1 data-cache access for `core`.
    pub fn record_l1d(&mut self, core: usize, hit: bool) {
        self.cores[core].l1d.record(hit);
    }

    /// Records one shared/partitioned L2 access.
    pub fn record_l2(&mut self, hit: bool) {
        self.l2.record(hit);
    }

    /// Records one DRAM-bank row-buffer access.
    pub fn record_dram_bank(&mut self, hit: bool) {
        self.dram_bank.record(hit);
    }

    /// Records one RMT soft miss (hit in the RMT, miss in the backing slot).
    pub fn record_rmt_soft_miss(&mut self) {
        self.rmt_soft_misses += 1;
    }

    /// Records the PC a core fetched from, if histogram collection is on.
    pub fn record_pc(&mut self, core: usize, pc: u64) {
        if !self.histogram_enabled {
            return;
        }
        let page = pc >> crate::common::constants::PAGE_SHIFT;
        *self.cores[core].pc_histogram.entry(page).or_insert(0) += 1;
    }

    /// Prints a formatted statistics report to stdout: per-core instruction
    /// counts, aggregate cache hit rates per level, and (when enabled) the
    /// PC histogram, most-visited page first.
    pub fn print(&self) {
        println!("\n==========================================================");
        println!("ENCLAVE SIMULATOR STATISTICS");
        println!("==========================================================");
        for (i, core) in self.cores.iter().enumerate() {
            println!(
                "core {i:<2} insns={:<10} traps={:<6} l1i_miss={:.4} l1d_miss={:.4}",
                core.instructions_retired,
                core.traps_taken,
                core.l1i.miss_rate(),
                core.l1d.miss_rate(),
            );
        }
        println!("----------------------------------------------------------");
        println!(
            "l2        accesses={:<10} miss_rate={:.4}",
            self.l2.hits + self.l2.misses,
            self.l2.miss_rate()
        );
        println!("l2.rmt_soft_misses  {}", self.rmt_soft_misses);
        println!(
            "dram_bank accesses={:<10} miss_rate={:.4}",
            self.dram_bank.hits + self.dram_bank.misses,
            self.dram_bank.miss_rate()
        );
        if self.histogram_enabled {
            println!("----------------------------------------------------------");
            println!("PC HISTOGRAM (by page)");
            for (i, core) in self.cores.iter().enumerate() {
                let mut pages: Vec<_> = core.pc_histogram.iter().collect();
                pages.sort_by(|a, b| b.1.cmp(a.1));
                for (page, count) in pages.into_iter().take(8) {
                    println!("  core {i} page {:#x} visits={count}", page << crate::common::constants::PAGE_SHIFT);
                }
            }
        }
        println!("==========================================================");
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheCounters, SimStats};

    #[test]
    fn miss_rate_is_zero_with_no_accesses() {
        assert_eq!(CacheCounters::default().miss_rate(), 0.0);
    }

    #[test]
    fn miss_rate_tracks_recorded_outcomes() {
        let mut c = CacheCounters::default();
        c.record(true);
        c.record(false);
        c.record(false);
        assert!((c.miss_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn histogram_disabled_by_default_records_nothing() {
        let mut stats = SimStats::new(1, false);
        stats.record_pc(0, 0x1000);
        assert!(stats.cores[0].pc_histogram.is_empty());
    }

    #[test]
    fn histogram_enabled_buckets_by_page() {
        let mut stats = SimStats::new(1, true);
        stats.record_pc(0, 0x1000);
        stats.record_pc(0, 0x1004);
        stats.record_pc(0, 0x2000);
        assert_eq!(stats.cores[0].pc_histogram.len(), 2);
    }
}
