//! Enclave identifiers.
//!
//! An [`EnclaveId`] names either the non-enclave "normal world", the privileged
//! management shim, the sentinel invalid id, or a live enclave allocated by the
//! shim. Three values are reserved; see the associated constants below.

use std::fmt;

/// Reserved id for the non-enclave ("normal world") context.
pub const RAW_DEFAULT: u64 = 0;
/// Reserved id for the management shim. All bits set.
pub const RAW_MANAGEMENT: u64 = u64::MAX;
/// Reserved id for "no enclave" / invalid. All bits set except the lowest.
pub const RAW_INVALID: u64 = u64::MAX - 1;

/// An opaque 64-bit enclave identifier.
///
/// Live enclave ids are allocated monotonically by the management shim
/// starting from 1; [`RAW_MANAGEMENT`] and [`RAW_INVALID`] are carved out of
/// the top of the id space so they can never collide with an allocation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct EnclaveId(pub u64);

impl EnclaveId {
    /// The non-enclave / normal-world context.
    pub const DEFAULT: Self = Self(RAW_DEFAULT);
    /// The management shim, running as its own pseudo-enclave.
    pub const MANAGEMENT: Self = Self(RAW_MANAGEMENT);
    /// Sentinel for "no enclave" / an invalid id.
    pub const INVALID: Self = Self(RAW_INVALID);

    /// Returns whether this id names a live, shim-allocated enclave (i.e. none
    /// of the three reserved values).
    #[must_use]
    pub const fn is_live(self) -> bool {
        !(self.0 == RAW_DEFAULT || self.0 == RAW_MANAGEMENT || self.0 == RAW_INVALID)
    }

    /// Raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for EnclaveId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for EnclaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DEFAULT => write!(f, "DEFAULT"),
            Self::MANAGEMENT => write!(f, "MANAGEMENT"),
            Self::INVALID => write!(f, "INVALID"),
            Self(v) => write!(f, "E{v}"),
        }
    }
}

/// Monotonic allocator for live enclave ids, owned by the management shim.
#[derive(Debug)]
pub struct EnclaveIdAllocator {
    next: u64,
}

impl EnclaveIdAllocator {
    /// Creates an allocator that hands out `1, 2, 3, ...`.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocates the next enclave id.
    pub fn allocate(&mut self) -> EnclaveId {
        let id = EnclaveId(self.next);
        self.next += 1;
        id
    }
}

impl Default for EnclaveIdAllocator {
    /// Starts from the same `next = 1` as [`EnclaveIdAllocator::new`] — a
    /// derived `Default` would leave `next = 0` and hand out `EnclaveId(0)`
    /// (`EnclaveId::DEFAULT`) as the first "live" id, which is reserved.
    fn default() -> Self {
        Self::new()
    }
}
