//! Configuration structures for LoamDB.

use crate::error::{LoamError, Result};
use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files.
    pub data_dir: PathBuf,
    /// Page size in bytes.
    pub page_size: usize,
    /// Buffer pool size in number of pages.
    pub buffer_pool_pages: usize,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            page_size: PAGE_SIZE,
            buffer_pool_pages: 8192, // 128 MB with 16 KB pages
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_pages * self.page_size
    }
}

/// Fan-out configuration for a B+ tree index.
///
/// `leaf_max_size` bounds leaf occupancy: a leaf holds at most
/// `leaf_max_size - 1` entries between operations and splits upon reaching
/// `leaf_max_size`. `internal_max_size` bounds the number of children of an
/// internal node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BTreeConfig {
    /// Leaf node capacity bound.
    pub leaf_max_size: u16,
    /// Internal node capacity bound (number of children).
    pub internal_max_size: u16,
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self {
            leaf_max_size: 32,
            internal_max_size: 32,
        }
    }
}

impl BTreeConfig {
    /// Checks the lower bounds on fan-out. Upper bounds depend on the page
    /// layout and are validated by the index when it is created.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_max_size < 3 {
            return Err(LoamError::InvalidConfig(
                "leaf_max_size must be >= 3".to_string(),
            ));
        }
        if self.internal_max_size < 3 {
            return Err(LoamError::InvalidConfig(
                "internal_max_size must be >= 3".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.page_size, PAGE_SIZE);
        assert_eq!(config.page_size, 16384);
        assert_eq!(config.buffer_pool_pages, 8192);
        assert!(config.fsync_enabled);
    }

    #[test]
    fn test_buffer_pool_size_bytes() {
        let config = StorageConfig::default();
        assert_eq!(config.buffer_pool_size_bytes(), 8192 * 16384);
        assert_eq!(config.buffer_pool_size_bytes(), 134_217_728);
    }

    #[test]
    fn test_storage_config_custom() {
        let config = StorageConfig {
            data_dir: PathBuf::from("/var/lib/loamdb"),
            page_size: 8192,
            buffer_pool_pages: 1024,
            fsync_enabled: false,
        };
        assert_eq!(config.buffer_pool_size_bytes(), 1024 * 8192);
        assert!(!config.fsync_enabled);
    }

    #[test]
    fn test_storage_config_serde_roundtrip() {
        let original = StorageConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.data_dir, deserialized.data_dir);
        assert_eq!(original.page_size, deserialized.page_size);
        assert_eq!(original.buffer_pool_pages, deserialized.buffer_pool_pages);
        assert_eq!(original.fsync_enabled, deserialized.fsync_enabled);
    }

    #[test]
    fn test_btree_config_defaults() {
        let config = BTreeConfig::default();
        assert_eq!(config.leaf_max_size, 32);
        assert_eq!(config.internal_max_size, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_btree_config_validate_rejects_tiny_fanout() {
        let config = BTreeConfig {
            leaf_max_size: 2,
            internal_max_size: 32,
        };
        assert!(config.validate().is_err());

        let config = BTreeConfig {
            leaf_max_size: 32,
            internal_max_size: 1,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_btree_config_validate_accepts_minimum() {
        let config = BTreeConfig {
            leaf_max_size: 3,
            internal_max_size: 3,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_btree_config_serde_roundtrip() {
        let original = BTreeConfig {
            leaf_max_size: 16,
            internal_max_size: 24,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: BTreeConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original.leaf_max_size, deserialized.leaf_max_size);
        assert_eq!(original.internal_max_size, deserialized.internal_max_size);
    }
}
