//! Page identifiers and page-level constants for LoamDB storage.

use serde::{Deserialize, Serialize};

/// Default page size in bytes (16 KB).
pub const PAGE_SIZE: usize = 16 * 1024;

/// Unique identifier for a page within the data file.
///
/// Page 0 is reserved for the index directory (header page). The sentinel
/// [`PageId::INVALID`] denotes "no page".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel value denoting "no page".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// The page holding the index directory records.
    pub const HEADER: PageId = PageId(0);

    /// Creates a new PageId.
    pub fn new(page_num: u32) -> Self {
        Self(page_num)
    }

    /// Returns true if this is not the invalid sentinel.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Serializes the page id to little-endian bytes.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Deserializes a page id from little-endian bytes.
    pub fn from_bytes(buf: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(buf))
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 16 * 1024);
        assert_eq!(PAGE_SIZE, 16384);
    }

    #[test]
    fn test_page_id_new() {
        let page_id = PageId::new(100);
        assert_eq!(page_id.0, 100);
        assert!(page_id.is_valid());
    }

    #[test]
    fn test_page_id_invalid() {
        assert!(!PageId::INVALID.is_valid());
        assert_eq!(PageId::INVALID.0, u32::MAX);
        assert!(PageId::HEADER.is_valid());
        assert_eq!(PageId::HEADER.0, 0);
    }

    #[test]
    fn test_page_id_byte_roundtrip() {
        for page_id in [PageId::new(0), PageId::new(42), PageId::new(u32::MAX - 1)] {
            assert_eq!(PageId::from_bytes(page_id.to_bytes()), page_id);
        }
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId::new(5).to_string(), "5");
        assert_eq!(PageId::INVALID.to_string(), "invalid");
    }

    #[test]
    fn test_page_id_ordering() {
        assert!(PageId::new(1) < PageId::new(2));
        assert!(PageId::new(100) < PageId::INVALID);
    }

    #[test]
    fn test_page_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(PageId::new(1));
        set.insert(PageId::new(2));
        set.insert(PageId::new(1)); // Duplicate

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId::new(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
