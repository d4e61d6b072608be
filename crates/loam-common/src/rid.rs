//! Record identifiers for tuples referenced by index entries.

use crate::page::PageId;
use serde::{Deserialize, Serialize};

/// Identifies a tuple by the heap page holding it and its slot on that page.
///
/// Index leaves store a `RecordId` as the value for each key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// The page holding the tuple.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u16,
}

impl RecordId {
    /// Serialized size on disk: page id (4 bytes) + slot (2 bytes).
    pub const SIZE: usize = 6;

    /// Creates a new RecordId.
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }

    /// Derives a record id from a signed 64-bit key, for workloads that
    /// generate record locations from the key itself.
    pub fn from_i64(key: i64) -> Self {
        Self {
            page_id: PageId::new((key >> 16) as u32),
            slot: (key & 0xFFFF) as u16,
        }
    }

    /// Serializes to little-endian bytes.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_id.to_bytes());
        buf[4..6].copy_from_slice(&self.slot.to_le_bytes());
        buf
    }

    /// Deserializes from little-endian bytes.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_id: PageId::from_bytes([buf[0], buf[1], buf[2], buf[3]]),
            slot: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}
