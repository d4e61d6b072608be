//! Concurrent B+ tree index.
//!
//! The tree is built from four layers:
//!
//! - Node layout (`node`, `leaf`, `internal`): typed operations over
//!   fixed-size page bytes. Leaves hold sorted `(key, RecordId)` entries in
//!   a slotted layout with a sibling pointer; internal nodes hold sorted
//!   `(separator, child)` entries where slot 0's key is a sentinel.
//! - Structural algorithms (`tree`): search, insert with splits, remove
//!   with coalesce/redistribute, root adjustment.
//! - Concurrency control: a root mutex guarding the root page id plus
//!   per-page reader/writer latches, combined with crabbing. A child is
//!   latched before its parent is released, and retained ancestors live in
//!   the operation's [`Transaction`] until a safe child lets them go.
//! - Iteration (`iterator`): a forward cursor threaded through the leaf
//!   sibling chain.

mod header_page;
mod internal;
mod iterator;
mod key;
mod leaf;
mod node;
mod transaction;
mod tree;

pub use iterator::TreeIterator;
pub use key::{compare_keys, decode_i64_key, encode_i64_key, KeyComparator, MAX_KEY_SIZE};
pub use transaction::Transaction;
pub use tree::BPlusTree;
