//! Buffer pool management for LoamDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable page count
//! - Clock eviction policy for cache management
//! - Pin counting for concurrent access
//! - Dirty page tracking for write-back
//! - RAII page guards coupling pin lifetime to latch lifetime

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{
    BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage, PageReadGuard, PageWriteGuard,
    PinnedPage,
};
pub use replacer::{ClockReplacer, Replacer};
