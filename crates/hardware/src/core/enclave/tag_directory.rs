//! Tag directory: per-page `(owner, reader)` metadata gating every memory access.
//!
//! Mapped into the physical address space at a fixed base (see
//! [`crate::common::constants::TAGDIRECTORY_BASE`]) so it can be read directly
//! by any context, but writes go through [`TagDirectory::mmio_store`], which
//! enforces the discipline from the design: the management shim may write
//! either field of any entry; anyone else may only write the `reader` field of
//! a page it owns.

use crate::common::addr::PhysAddr;
use crate::common::error::Trap;
use crate::core::enclave::ids::EnclaveId;

/// Width in bytes of a single `EnclaveId` field in the tag directory.
pub const ID_WIDTH: u64 = 8;
/// Size in bytes of one `PageTag` entry (owner + reader).
pub const ENTRY_SIZE: u64 = ID_WIDTH * 2;

/// Per-page ownership tag.
///
/// Invariant: `owner != EnclaveId::INVALID` for every page backing main
/// memory. A page is readable by its `owner` and, additionally, by `reader`
/// if one has been granted; stores are only ever permitted for `owner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTag {
    /// The enclave (or `DEFAULT`) allowed to fetch from and store to this page.
    pub owner: EnclaveId,
    /// An additional enclave granted read-only access, or `INVALID` if none.
    pub reader: EnclaveId,
}

impl Default for PageTag {
    fn default() -> Self {
        Self {
            owner: EnclaveId::DEFAULT,
            reader: EnclaveId::INVALID,
        }
    }
}

/// Dense, page-indexed array of [`PageTag`] covering all of main memory.
pub struct TagDirectory {
    tags: Vec<PageTag>,
    base: PhysAddr,
    dram_base: u64,
    page_shift: u64,
}

impl TagDirectory {
    /// Creates a tag directory for `num_pages` pages of main memory, all reset
    /// to `owner = DEFAULT, reader = INVALID`.
    ///
    /// * `base` - MMIO base address this directory is mapped at.
    /// * `dram_base` - Base physical address of main memory (pages are numbered
    ///   relative to this).
    /// * `page_shift` - `log2(PAGE_SIZE)`.
    #[must_use]
    pub fn new(num_pages: usize, base: PhysAddr, dram_base: u64, page_shift: u64) -> Self {
        Self {
            tags: vec![PageTag::default(); num_pages],
            base,
            dram_base,
            page_shift,
        }
    }

    /// MMIO base address of this directory.
    #[must_use]
    pub const fn base(&self) -> PhysAddr {
        self.base
    }

    /// Total size in bytes of the MMIO region (`2 * ID_WIDTH * num_pages`).
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.tags.len() as u64 * ENTRY_SIZE
    }

    /// Number of pages tracked.
    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.tags.len()
    }

    /// Converts a physical address within main memory to a page index, if in range.
    #[must_use]
    pub fn page_of(&self, paddr: u64) -> Option<usize> {
        if paddr < self.dram_base {
            return None;
        }
        let page = ((paddr - self.dram_base) >> self.page_shift) as usize;
        if page < self.tags.len() { Some(page) } else { None }
    }

    /// Reads the tag for `page`. Tag reads are unrestricted (any issuer).
    #[must_use]
    pub fn get(&self, page: usize) -> PageTag {
        self.tags.get(page).copied().unwrap_or_default()
    }

    /// Sets `tag[page].owner`. Used by the `donate-page` and `change-page-tag`
    /// control registers; callers are responsible for applying the access
    /// discipline (management-only, or owner-only) before calling this.
    pub fn set_owner(&mut self, page: usize, owner: EnclaveId) -> bool {
        match self.tags.get_mut(page) {
            Some(t) => {
                t.owner = owner;
                true
            }
            None => false,
        }
    }

    /// Sets `tag[page].reader`. Used by the `assign-reader` control register.
    pub fn set_reader(&mut self, page: usize, reader: EnclaveId) -> bool {
        match self.tags.get_mut(page) {
            Some(t) => {
                t.reader = reader;
                true
            }
            None => false,
        }
    }

    /// Handles a raw MMIO store into the tag directory region, applying the
    /// write discipline described in the design: management may write any
    /// field; anyone else may only write the `reader` field of a page they own.
    ///
    /// `offset` is relative to [`TagDirectory::base`]. `len` must equal
    /// `ID_WIDTH` (one identifier) and the write must be aligned to a field
    /// boundary, or this fails with a store-access fault and leaves the
    /// directory unmodified.
    pub fn mmio_store(
        &mut self,
        issuer: EnclaveId,
        offset: u64,
        len: u64,
        value: u64,
    ) -> Result<(), Trap> {
        if len != ID_WIDTH || offset % ID_WIDTH != 0 {
            return Err(Trap::StoreAccessFault(self.base.val() + offset));
        }
        let entry = offset / ENTRY_SIZE;
        let field_off = offset % ENTRY_SIZE;
        let page = entry as usize;
        let Some(tag) = self.tags.get_mut(page) else {
            return Err(Trap::StoreAccessFault(self.base.val() + offset));
        };

        let is_owner_field = field_off == 0;
        if issuer == EnclaveId::MANAGEMENT {
            if is_owner_field {
                tag.owner = EnclaveId(value);
            } else {
                tag.reader = EnclaveId(value);
            }
            return Ok(());
        }

        if is_owner_field || tag.owner != issuer {
            return Err(Trap::StoreAccessFault(self.base.val() + offset));
        }
        tag.reader = EnclaveId(value);
        Ok(())
    }

    /// Handles a raw MMIO load from the tag directory region. Reads are
    /// unrestricted; out-of-range reads return zero.
    #[must_use]
    pub fn mmio_load(&self, offset: u64, len: u64) -> u64 {
        let entry = offset / ENTRY_SIZE;
        let field_off = offset % ENTRY_SIZE;
        let page = entry as usize;
        let Some(tag) = self.tags.get(page) else {
            return 0;
        };
        let raw = if field_off == 0 {
            tag.owner.raw()
        } else {
            tag.reader.raw()
        };
        if len >= ID_WIDTH {
            raw
        } else {
            raw & ((1u64 << (len * 8)) - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dir_with_owner(owner: EnclaveId) -> TagDirectory {
        let mut dir = TagDirectory::new(4, PhysAddr::new(0), 0, 12);
        dir.set_owner(0, owner);
        dir
    }

    proptest! {
        /// Invariant 6: a non-management store to the tag directory succeeds
        /// iff it targets the reader field of a page the issuer owns with a
        /// correctly sized, aligned write; any other shape leaves the entry
        /// untouched.
        #[test]
        fn write_discipline(
            owner in 0u64..5,
            issuer in 0u64..5,
            target_owner_field in any::<bool>(),
            len in 0u64..16,
        ) {
            let owner = EnclaveId(owner);
            let issuer = EnclaveId(issuer);
            let mut dir = dir_with_owner(owner);
            let before = dir.get(0);
            let offset = if target_owner_field { 0 } else { ID_WIDTH };
            let result = dir.mmio_store(issuer, offset, len, 0xAAAA);

            let should_succeed = len == ID_WIDTH && !target_owner_field && issuer == owner;
            prop_assert_eq!(result.is_ok(), should_succeed);
            if !should_succeed {
                prop_assert_eq!(dir.get(0), before);
            }
        }

        /// Management may always write either field, regardless of current owner.
        #[test]
        fn management_writes_any_field(owner in 0u64..5, target_owner_field in any::<bool>()) {
            let owner = EnclaveId(owner);
            let mut dir = dir_with_owner(owner);
            let offset = if target_owner_field { 0 } else { ID_WIDTH };
            let result = dir.mmio_store(EnclaveId::MANAGEMENT, offset, ID_WIDTH, 0xBEEF);
            prop_assert!(result.is_ok());
            let tag = dir.get(0);
            if target_owner_field {
                prop_assert_eq!(tag.owner, EnclaveId(0xBEEF));
            } else {
                prop_assert_eq!(tag.reader, EnclaveId(0xBEEF));
            }
        }
    }
}
