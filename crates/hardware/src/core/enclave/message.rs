//! Mailbox wire format.
//!
//! One [`Message`] occupies a fixed-size, cache-line-aligned slot at
//! `MAILBOX_BASE + core_index * MESSAGE_SIZE`. A slot is "empty" iff its
//! `type` field reads as [`MessageType::Invalid`].
//!
//! ```text
//! offset 0:   type          (u32)
//! offset 4:   padding
//! offset 8:   source        (u64)
//! offset 16:  destination   (u64)
//! offset 24:  content       (u64)
//! total:      32 bytes, aligned to a cache line
//! ```

use crate::core::enclave::ids::EnclaveId;

/// Size in bytes of one mailbox slot.
pub const MESSAGE_SIZE: u64 = 32;

const OFF_TYPE: usize = 0;
const OFF_SOURCE: usize = 8;
const OFF_DEST: usize = 16;
const OFF_CONTENT: usize = 24;

/// Kind of control-plane message carried in a mailbox slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    /// Empty slot / no message.
    Invalid = 0,
    /// Request a new enclave be allocated.
    CreateEnclave = 1,
    /// Reserved: tear down an enclave. Minimal reply only.
    DeleteEnclave = 2,
    /// Reserved: remote attestation. Stubbed.
    Attest = 3,
    /// Reserved: acquire a physical-memory capability. Minimal reply only.
    AcquirePhysCap = 4,
    /// Donate ownership of a page to the argument enclave.
    DonatePage = 5,
    /// Dispatch the argument enclave onto its target core.
    SwitchEnclave = 6,
    /// Stash an enclave id for a following `DonatePage`/`SwitchEnclave`.
    SetArgument = 7,
    /// Reserved: enclave-to-enclave messaging. Minimal reply only.
    InterEnclave = 8,
}

impl MessageType {
    /// Decodes a raw `u32`, mapping anything unrecognized to `Invalid`.
    #[must_use]
    pub const fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::CreateEnclave,
            2 => Self::DeleteEnclave,
            3 => Self::Attest,
            4 => Self::AcquirePhysCap,
            5 => Self::DonatePage,
            6 => Self::SwitchEnclave,
            7 => Self::SetArgument,
            8 => Self::InterEnclave,
            _ => Self::Invalid,
        }
    }
}

/// A decoded mailbox message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message kind; `Invalid` means the slot is empty.
    pub msg_type: MessageType,
    /// Enclave that wrote this message. Hardware-overwritten on store; never
    /// trusted from software.
    pub source: EnclaveId,
    /// Intended recipient enclave.
    pub destination: EnclaveId,
    /// Message-specific payload.
    pub content: u64,
}

impl Message {
    /// The canonical empty message (`type == Invalid`, all other fields zero).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            msg_type: MessageType::Invalid,
            source: EnclaveId::DEFAULT,
            destination: EnclaveId::DEFAULT,
            content: 0,
        }
    }

    /// Encodes this message into its 32-byte little-endian wire format.
    #[must_use]
    pub fn encode(&self) -> [u8; MESSAGE_SIZE as usize] {
        let mut buf = [0u8; MESSAGE_SIZE as usize];
        buf[OFF_TYPE..OFF_TYPE + 4].copy_from_slice(&(self.msg_type as u32).to_le_bytes());
        buf[OFF_SOURCE..OFF_SOURCE + 8].copy_from_slice(&self.source.raw().to_le_bytes());
        buf[OFF_DEST..OFF_DEST + 8].copy_from_slice(&self.destination.raw().to_le_bytes());
        buf[OFF_CONTENT..OFF_CONTENT + 8].copy_from_slice(&self.content.to_le_bytes());
        buf
    }

    /// Decodes a message from a 32-byte slot. Panics if `bytes` is shorter
    /// than [`MESSAGE_SIZE`] (a programming error: slots are fixed-size).
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let mut f4 = [0u8; 4];
        let mut f8a = [0u8; 8];
        let mut f8b = [0u8; 8];
        let mut f8c = [0u8; 8];
        f4.copy_from_slice(&bytes[OFF_TYPE..OFF_TYPE + 4]);
        f8a.copy_from_slice(&bytes[OFF_SOURCE..OFF_SOURCE + 8]);
        f8b.copy_from_slice(&bytes[OFF_DEST..OFF_DEST + 8]);
        f8c.copy_from_slice(&bytes[OFF_CONTENT..OFF_CONTENT + 8]);
        let type_raw = u32::from_le_bytes(f4);
        let source = u64::from_le_bytes(f8a);
        let destination = u64::from_le_bytes(f8b);
        let content = u64::from_le_bytes(f8c);
        Self {
            msg_type: MessageType::from_u32(type_raw),
            source: EnclaveId(source),
            destination: EnclaveId(destination),
            content,
        }
    }

    /// Reads just the `type` field out of a raw slot, for the MMU's
    /// consuming-load fast path.
    #[must_use]
    pub fn peek_type(bytes: &[u8]) -> MessageType {
        let mut f4 = [0u8; 4];
        f4.copy_from_slice(&bytes[OFF_TYPE..OFF_TYPE + 4]);
        MessageType::from_u32(u32::from_le_bytes(f4))
    }
}

/// Byte offset of the `type` field within a slot (used by the MMU to detect
/// the consuming-load special case).
pub const OFFSET_TYPE: u64 = OFF_TYPE as u64;
/// Byte offset of the `source` field within a slot (overwritten by hardware
/// on every store to prevent spoofing).
pub const OFFSET_SOURCE: u64 = OFF_SOURCE as u64;
