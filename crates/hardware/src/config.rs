//! Simulator configuration: the deserializable, validated surface behind the
//! CLI flags in `enclave-sim-cli` (see crate docs for the full flag list).
//!
//! A [`Config`] can be built directly (`Config::default()` plus field
//! overrides, the way the CLI builds one from parsed flags) or deserialized
//! from a JSON file with `serde_json`, for scripted sweeps that want to pin
//! down a whole configuration in one place. [`Config::validate`] is the single
//! gate between "what the user asked for" and "what the builder is allowed to
//! assume": cache geometries are checked for power-of-two set/way counts,
//! `hartids` (when given) must have one entry per configured core, and the
//! partitioning mode must be one the cache hierarchy actually implements.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a [`Config`] or while the CLI is turning
/// flags into one. Distinct from [`crate::common::Trap`]: these are
/// configuration-time, user-facing failures, not instruction-execution
/// faults, and are reported by the CLI with exit code 1 per the design's
/// "configuration errors fail fast" rule.
#[derive(Debug, Error)]
pub enum SimError {
    /// A `sets:ways:linesize` cache geometry string failed to parse.
    #[error("invalid cache geometry {spec:?}: {reason}")]
    BadCacheGeometry {
        /// The offending geometry string.
        spec: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Set count, way count, or line size was not a power of two (or zero).
    #[error("cache geometry {0:?} must have power-of-two sets/ways/line size")]
    NonPowerOfTwoGeometry(CacheGeometry),
    /// `--hartids` was given but its length didn't match the core count.
    #[error("{given} hartids given for {expected} configured cores")]
    HartidCountMismatch {
        /// Number of hartids the user supplied.
        given: usize,
        /// Number of cores (`procs + enclave_cores [+ 1 for the shim]`).
        expected: usize,
    },
    /// A `-m` memory spec this crate doesn't implement (multi-region layout).
    #[error("multi-region memory layout {0:?} is not supported; use `-m <MiB>`")]
    UnsupportedMemoryLayout(String),
    /// The management binary could not be read from disk.
    #[error("could not read management binary {path:?}: {source}")]
    ManagementBinaryUnreadable {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The program binary could not be read from disk.
    #[error("could not read program binary {path:?}: {source}")]
    ProgramBinaryUnreadable {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// `sets:ways:linesize` geometry for an instruction, data, or L2 cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheGeometry {
    /// Number of sets.
    pub sets: usize,
    /// Ways per set.
    pub ways: usize,
    /// Line size in bytes; must be a power of two, at least 8.
    pub line_bytes: usize,
}

impl CacheGeometry {
    fn is_power_of_two(n: usize) -> bool {
        n != 0 && (n & (n - 1)) == 0
    }

    /// Checks the power-of-two/minimum-line-size constraints from §4.4.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        Self::is_power_of_two(self.sets)
            && Self::is_power_of_two(self.ways)
            && Self::is_power_of_two(self.line_bytes)
            && self.line_bytes >= 8
    }

    /// Parses a `sets:ways:linesize` string, e.g. `"64:4:64"`.
    pub fn parse(spec: &str) -> Result<Self, SimError> {
        let mut parts = spec.split(':');
        let (Some(s), Some(w), Some(b), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SimError::BadCacheGeometry {
                spec: spec.to_string(),
                reason: "expected exactly three colon-separated fields",
            });
        };
        let parse_field = |f: &str| {
            f.parse::<usize>().map_err(|_| SimError::BadCacheGeometry {
                spec: spec.to_string(),
                reason: "fields must be non-negative integers",
            })
        };
        let geometry = Self {
            sets: parse_field(s)?,
            ways: parse_field(w)?,
            line_bytes: parse_field(b)?,
        };
        if !geometry.is_valid() {
            return Err(SimError::NonPowerOfTwoGeometry(geometry));
        }
        Ok(geometry)
    }
}

impl Default for CacheGeometry {
    fn default() -> Self {
        Self {
            sets: 64,
            ways: 4,
            line_bytes: 64,
        }
    }
}

/// L2 partitioning scheme, selected by `--l2_partitioning`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitioningMode {
    /// Single shared LLC, no per-enclave isolation.
    #[default]
    None,
    /// Remapping-table front-end over a shared, randomly-assigned slot pool.
    Rmt,
    /// LLC split by set count, one slice per enclave.
    Static,
}

impl PartitioningMode {
    /// Parses the `0|1|2` values `--l2_partitioning` accepts.
    pub fn parse(spec: &str) -> Result<Self, SimError> {
        match spec {
            "0" => Ok(Self::None),
            "1" => Ok(Self::Rmt),
            "2" => Ok(Self::Static),
            _ => Err(SimError::BadCacheGeometry {
                spec: spec.to_string(),
                reason: "l2_partitioning must be 0, 1, or 2",
            }),
        }
    }
}

/// Full simulator configuration: core counts, memory layout, cache
/// geometries, and the observability/debug flags from the CLI surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of normal-world (`DEFAULT` enclave id) cores.
    pub procs: usize,
    /// Number of enclave-designated cores. When non-zero, one additional
    /// core running as `MANAGEMENT` is reserved, mirroring the original
    /// `spike.cc`'s `nenclaves += 1` adjustment.
    pub enclave_cores: usize,
    /// Main DRAM size in MiB.
    pub mem_mib: u64,
    /// L1 instruction cache geometry (per core).
    pub ic: CacheGeometry,
    /// L1 data cache geometry (per core).
    pub dc: CacheGeometry,
    /// L2 geometry (shared or partitioned per `l2_partitioning`).
    pub l2: CacheGeometry,
    /// L2 partitioning scheme.
    pub l2_partitioning: PartitioningMode,
    /// Informational ISA string.
    pub isa: String,
    /// Reset PC override. `None` uses the reset-vector ROM base.
    pub start_pc: Option<u64>,
    /// Explicit hartid assignment; empty means `0, 1, 2, ...`.
    pub hartids: Vec<u32>,
    /// Enable PC-histogram collection (`-g`).
    pub histogram: bool,
    /// Enable per-instruction execution tracing (`-l`).
    pub log: bool,
    /// Start every core halted (`-H`).
    pub start_halted: bool,
    /// Drop into an interactive step/continue/inspect prompt (`-d`) instead
    /// of free-running.
    pub debug: bool,
    /// Path to the precompiled management-shim binary image.
    pub manage_path: String,
    /// Per-core TLB entry count.
    pub tlb_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            procs: 1,
            enclave_cores: 0,
            mem_mib: 2048,
            ic: CacheGeometry::default(),
            dc: CacheGeometry::default(),
            l2: CacheGeometry::default(),
            l2_partitioning: PartitioningMode::None,
            isa: "rv64ima".to_string(),
            start_pc: None,
            hartids: Vec::new(),
            histogram: false,
            log: false,
            start_halted: false,
            debug: false,
            manage_path: "management.bin".to_string(),
            tlb_entries: crate::common::constants::DEFAULT_TLB_ENTRIES,
        }
    }
}

impl Config {
    /// Total number of cores the driver will step: normal cores, enclave
    /// cores, and (when `enclave_cores > 0`) one management-shim core.
    #[must_use]
    pub fn total_cores(&self) -> usize {
        self.procs + self.enclave_cores + usize::from(self.enclave_cores > 0)
    }

    /// Validates geometry and hartid constraints. Called once by the CLI
    /// before any device or core is constructed.
    pub fn validate(&self) -> Result<(), SimError> {
        for geometry in [self.ic, self.dc, self.l2] {
            if !geometry.is_valid() {
                return Err(SimError::NonPowerOfTwoGeometry(geometry));
            }
        }
        if !self.hartids.is_empty() && self.hartids.len() != self.total_cores() {
            return Err(SimError::HartidCountMismatch {
                given: self.hartids.len(),
                expected: self.total_cores(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheGeometry, Config, PartitioningMode, SimError};

    #[test]
    fn parses_valid_geometry() {
        let g = CacheGeometry::parse("64:4:64").unwrap();
        assert_eq!(
            g,
            CacheGeometry {
                sets: 64,
                ways: 4,
                line_bytes: 64
            }
        );
    }

    #[test]
    fn rejects_non_power_of_two_geometry() {
        assert!(matches!(
            CacheGeometry::parse("63:4:64"),
            Err(SimError::NonPowerOfTwoGeometry(_))
        ));
    }

    #[test]
    fn rejects_malformed_geometry() {
        assert!(CacheGeometry::parse("64:4").is_err());
    }

    #[test]
    fn partitioning_mode_parses_numeric_codes() {
        assert_eq!(PartitioningMode::parse("0").unwrap(), PartitioningMode::None);
        assert_eq!(PartitioningMode::parse("1").unwrap(), PartitioningMode::Rmt);
        assert_eq!(PartitioningMode::parse("2").unwrap(), PartitioningMode::Static);
        assert!(PartitioningMode::parse("3").is_err());
    }

    #[test]
    fn total_cores_reserves_a_management_core() {
        let mut cfg = Config {
            procs: 1,
            enclave_cores: 2,
            ..Config::default()
        };
        assert_eq!(cfg.total_cores(), 4);
        cfg.enclave_cores = 0;
        assert_eq!(cfg.total_cores(), 1);
    }

    #[test]
    fn validate_catches_hartid_mismatch() {
        let cfg = Config {
            hartids: vec![0, 1],
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SimError::HartidCountMismatch { .. })
        ));
    }
}
