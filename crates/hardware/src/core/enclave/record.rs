//! Enclave lifecycle record and state machine.
//!
//! ```text
//!           CREATE_ENCLAVE              DONATE_PAGE (first)         SWITCH_ENCLAVE
//!    ∅ ─────────────────────▶ CREATED ─────────────────────▶ RECEIVING_PAGES ─────────────▶ FINALIZED
//!                                          DONATE_PAGE (subsequent)
//!                                          ↻ RECEIVING_PAGES
//! ```
//! From `FINALIZED`, donates fail but a further `SWITCH_ENCLAVE` re-enters the
//! enclave at its saved context. Enclave records are never destroyed in this
//! design (see `DELETE_ENCLAVE` in [`crate::core::enclave::shim`]); that
//! mirrors an open question in the source left unresolved upstream.

use crate::core::enclave::ids::EnclaveId;

/// Lifecycle state of an [`EnclaveRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnclaveState {
    /// Allocated by `CREATE_ENCLAVE`; no pages donated yet.
    Created,
    /// At least one page has been donated; more may follow.
    ReceivingPages,
    /// `SWITCH_ENCLAVE` has occurred at least once; no further donations.
    Finalized,
}

/// Context saved across a switch away from an enclave.
///
/// Minimal by design: this simulator does not model a full trap-and-resume
/// pipeline for enclaves, only the entry point used on (re-)dispatch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SavedContext {
    /// Program counter to resume at on re-entry.
    pub pc: u64,
}

/// Shim-side bookkeeping for a single enclave.
#[derive(Clone, Debug)]
pub struct EnclaveRecord {
    /// This enclave's id.
    pub id: EnclaveId,
    /// Current lifecycle state.
    pub state: EnclaveState,
    /// Entry point recorded from the first donated page's `content`.
    pub code_entry_address: u64,
    /// Saved execution context, updated on dispatch.
    pub saved_context: SavedContext,
    /// Core index most recently dispatched to run this enclave, if any.
    pub assigned_core: Option<usize>,
}

impl EnclaveRecord {
    /// Creates a freshly-allocated enclave record in the `Created` state.
    #[must_use]
    pub fn new(id: EnclaveId) -> Self {
        Self {
            id,
            state: EnclaveState::Created,
            code_entry_address: 0,
            saved_context: SavedContext::default(),
            assigned_core: None,
        }
    }

    /// Whether this enclave may still accept `DONATE_PAGE` messages.
    #[must_use]
    pub const fn accepts_donations(&self) -> bool {
        matches!(self.state, EnclaveState::Created | EnclaveState::ReceivingPages)
    }

    /// Records a donated page. The first donation also records the entry
    /// point and advances `Created -> ReceivingPages`; subsequent donations
    /// while `ReceivingPages` are a self-loop. Returns `false` if the enclave
    /// is `Finalized` and cannot accept any more pages.
    pub fn donate(&mut self, entry_address_if_first: u64) -> bool {
        match self.state {
            EnclaveState::Created => {
                self.code_entry_address = entry_address_if_first;
                self.state = EnclaveState::ReceivingPages;
                true
            }
            EnclaveState::ReceivingPages => true,
            EnclaveState::Finalized => false,
        }
    }

    /// Advances to `Finalized` on the first switch; re-entry from
    /// `Finalized` is allowed and is a no-op transition.
    pub fn switch(&mut self, core: usize) {
        self.assigned_core = Some(core);
        self.state = EnclaveState::Finalized;
    }
}
