//! Index layer for LoamDB.
//!
//! This crate provides:
//! - Disk manager for page-level file I/O
//! - Pager combining the buffer pool with the disk manager
//! - Concurrent B+ tree index with latch crabbing
//! - Ordered iteration over index entries

mod disk;
mod pager;

pub mod btree;

pub use btree::{
    compare_keys, decode_i64_key, encode_i64_key, BPlusTree, KeyComparator, Transaction,
    TreeIterator, MAX_KEY_SIZE,
};
pub use disk::{DiskManager, DiskManagerConfig};
pub use pager::Pager;
