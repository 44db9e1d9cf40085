//! Custom control/status registers exposing the enclave operations.
//!
//! Addresses are chosen out of the RISC-V custom-CSR range (`0x800-0x8ff`,
//! read/write, machine-only). The exact numbers are an implementation
//! choice; nothing outside this module depends on their values.

/// Writing emits the low byte as a character to the host console.
pub const BARE_METAL_CHAR_OUT: u32 = 0x800;
/// Writing (any value) requests a halt of the issuing core.
pub const BARE_METAL_HALT: u32 = 0x801;

/// Writes stash an enclave id as the argument for a following
/// `donate-page`/`switch-enclave` message (normal-world side; mirrors the
/// shim's own `SET_ARGUMENT` message handling, see [`crate::core::enclave::shim`]).
pub const SET_ARGUMENT_ID: u32 = 0x810;
/// Writes grant read access on a page to an enclave. Subject to the tag
/// directory's write discipline (owner-only, `reader` field only).
pub const ASSIGN_READER: u32 = 0x811;
/// Writes donate a page (by address) to the current argument enclave.
/// Encoded as a `DONATE_PAGE` mailbox message to `MANAGEMENT` under the hood.
pub const DONATE_PAGE: u32 = 0x812;
/// Reads return this core's mailbox slot base address.
pub const GET_MAILBOX_BASE_FOR_SENDER: u32 = 0x813;
/// Writes retag a page directly (management-only in practice; non-management
/// writes are rejected by the tag directory's write discipline).
pub const CHANGE_PAGE_TAG: u32 = 0x814;
/// Writes enqueue a message into the issuer's own mailbox slot.
pub const SEND_MESSAGE: u32 = 0x815;
/// Reads consume and return the first message addressed to this core's
/// current enclave id (single-delivery; see [`crate::core::enclave::message`]).
pub const RECEIVE_MESSAGE: u32 = 0x816;
/// Reads return the issuing core's current enclave id.
pub const GET_ENCLAVE_ID: u32 = 0x817;
/// Reads return the running total of last-level-cache misses attributed to
/// this core's current enclave.
pub const LLC_MISS_COUNT: u32 = 0x818;

/// Writes set the core's current enclave id; only honored while PC lies
/// within the management shim's code page range (see
/// [`crate::common::constants::MANAGEMENT_ENCLAVE_BASE`]). This is how a
/// `SWITCH_ENCLAVE` dispatch takes effect on the target core.
pub const MANAGE_CHANGE_ENCLAVE_ID: u32 = 0x81f;
