//! Shared harness for B+ tree integration tests.

#![allow(dead_code)]

use loam_buffer::{BufferPool, BufferPoolConfig};
use loam_common::config::BTreeConfig;
use loam_common::rid::RecordId;
use loam_index::{
    compare_keys, decode_i64_key, encode_i64_key, BPlusTree, DiskManager, DiskManagerConfig, Pager,
    Transaction,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestDb {
    pub pager: Arc<Pager>,
    pub dir: TempDir,
}

/// Creates a fresh pager over a temp directory.
pub fn setup(num_frames: usize) -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let pager = pager_at(dir.path(), num_frames);
    TestDb { pager, dir }
}

/// Creates a pager over an existing data directory (for reopen tests).
pub fn pager_at(path: &Path, num_frames: usize) -> Arc<Pager> {
    let disk = Arc::new(
        DiskManager::new(DiskManagerConfig {
            data_dir: path.to_path_buf(),
            fsync_enabled: false,
        })
        .unwrap(),
    );
    let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames }));
    Arc::new(Pager::new(disk, pool))
}

pub fn open_tree(pager: Arc<Pager>, name: &str, leaf_max: u16, internal_max: u16) -> BPlusTree {
    BPlusTree::new(
        name,
        pager,
        compare_keys,
        &BTreeConfig {
            leaf_max_size: leaf_max,
            internal_max_size: internal_max,
        },
    )
    .unwrap()
}

pub fn key(k: i64) -> [u8; 8] {
    encode_i64_key(k)
}

pub fn rid(k: i64) -> RecordId {
    RecordId::from_i64(k)
}

pub fn insert_all(tree: &BPlusTree, keys: impl IntoIterator<Item = i64>) {
    let mut txn = Transaction::new();
    for k in keys {
        assert!(tree.insert(&key(k), rid(k), &mut txn).unwrap(), "key {}", k);
    }
}

pub fn remove_all(tree: &BPlusTree, keys: impl IntoIterator<Item = i64>) {
    let mut txn = Transaction::new();
    for k in keys {
        tree.remove(&key(k), &mut txn).unwrap();
    }
}

/// Full ordered scan, decoded back to i64 keys.
pub fn scan_keys(tree: &BPlusTree) -> Vec<i64> {
    tree.iter()
        .unwrap()
        .map(|(k, _)| decode_i64_key(&k))
        .collect()
}
