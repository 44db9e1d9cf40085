//! General-purpose register file.
//!
//! Floating-point state is out of scope for this simulator (see crate docs); only
//! the integer register file is modeled.

use crate::core::arch::gpr::Gpr;

/// Thin wrapper around the integer register file.
///
/// Kept as its own type (rather than using `Gpr` directly) so CPU code has a
/// stable place to grow register-file-wide behavior (e.g. dumping) without
/// reaching into the GPR internals.
pub struct RegisterFile {
    gpr: Gpr,
}

impl RegisterFile {
    /// Creates a new register file with all registers initialized to zero.
    pub fn new() -> Self {
        Self { gpr: Gpr::new() }
    }

    /// Reads a value from a general-purpose register.
    ///
    /// # Arguments
    ///
    /// * `idx` - Register index (0-31). Register `x0` always returns 0.
    pub fn read(&self, idx: usize) -> u64 {
        self.gpr.read(idx)
    }

    /// Writes a value to a general-purpose register.
    ///
    /// # Arguments
    ///
    /// * `idx` - Register index (0-31). Writes to `x0` are ignored.
    /// * `val` - The 64-bit value to write.
    pub fn write(&mut self, idx: usize, val: u64) {
        self.gpr.write(idx, val);
    }

    /// Dumps the contents of all general-purpose registers to stderr.
    pub fn dump(&self) {
        self.gpr.dump();
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
