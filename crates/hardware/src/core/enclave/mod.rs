//! Enclave isolation: identifiers, the tag directory, lifecycle records, the
//! mailbox wire format, and the management shim that drives enclave lifecycle
//! transitions over that mailbox.

/// Enclave identifier type and the monotonic allocator the shim uses.
pub mod ids;

/// Mailbox wire format (`Message`, `MessageType`).
pub mod message;

/// Per-enclave lifecycle bookkeeping (`EnclaveRecord`, `EnclaveState`).
pub mod record;

/// Management-shim message-handling state machine.
pub mod shim;

/// Per-page `(owner, reader)` tag storage and its MMIO access discipline.
pub mod tag_directory;

pub use ids::{EnclaveId, EnclaveIdAllocator};
pub use message::{Message, MessageType};
pub use record::{EnclaveRecord, EnclaveState};
pub use shim::{ManagementShim, SwitchRequest};
pub use tag_directory::{PageTag, TagDirectory};
