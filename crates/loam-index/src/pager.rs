//! Pager: buffer pool + disk manager composition.
//!
//! All page access is routed through the buffer pool. On a pool miss the
//! page is read from disk and installed; dirty pages displaced by the
//! install are written back before the install is considered complete.

use crate::disk::{DiskManager, DiskManagerConfig};
use loam_buffer::{BufferPool, BufferPoolConfig, PageReadGuard, PageWriteGuard, PinnedPage};
use loam_common::config::StorageConfig;
use loam_common::page::{PageId, PAGE_SIZE};
use loam_common::{LoamError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Coordinates the buffer pool and the disk manager.
///
/// The pool never evicts a pinned page, and latches are only reachable
/// through pin-holding guards, so no caller can hold a latch on a page the
/// pool might recycle.
pub struct Pager {
    /// Disk manager for page I/O.
    disk: Arc<DiskManager>,
    /// Buffer pool for page caching.
    pool: Arc<BufferPool>,
    /// Serializes pool misses so concurrent loaders cannot install the same
    /// page into two frames.
    load_lock: Mutex<()>,
}

impl Pager {
    /// Creates a new pager.
    pub fn new(disk: Arc<DiskManager>, pool: Arc<BufferPool>) -> Self {
        Self {
            disk,
            pool,
            load_lock: Mutex::new(()),
        }
    }

    /// Builds a pager from a storage configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        if config.page_size != PAGE_SIZE {
            return Err(LoamError::InvalidConfig(format!(
                "page_size must be {} bytes",
                PAGE_SIZE
            )));
        }
        let disk = Arc::new(DiskManager::new(DiskManagerConfig {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        })?);
        let pool = Arc::new(BufferPool::new(BufferPoolConfig {
            num_frames: config.buffer_pool_pages,
        }));
        Ok(Self::new(disk, pool))
    }

    /// Returns the underlying buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns the number of pages in the data file.
    pub fn num_pages(&self) -> u32 {
        self.disk.num_pages()
    }

    /// Fetches a page with a read latch, loading it from disk on a miss.
    pub fn fetch_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        loop {
            if let Some(guard) = self.pool.read_page(page_id) {
                return Ok(guard);
            }
            if let Some(guard) = self.load_miss(page_id)? {
                return Ok(guard.downgrade());
            }
        }
    }

    /// Fetches a page with a write latch, loading it from disk on a miss.
    pub fn fetch_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        loop {
            if let Some(guard) = self.pool.write_page(page_id) {
                return Ok(guard);
            }
            if let Some(guard) = self.load_miss(page_id)? {
                return Ok(guard);
            }
        }
    }

    /// Pins a page without latching it, loading it from disk on a miss.
    pub fn fetch_pin(&self, page_id: PageId) -> Result<PinnedPage<'_>> {
        loop {
            if let Some(pinned) = self.pool.pin_page(page_id) {
                return Ok(pinned);
            }
            if let Some(guard) = self.load_miss(page_id)? {
                return Ok(guard.into_pinned());
            }
        }
    }

    /// Handles a pool miss for `page_id`.
    ///
    /// Returns None if another thread installed the page first; the caller
    /// retries its latch acquisition outside the load lock, so a loader
    /// never blocks on a page latch while holding it.
    fn load_miss(&self, page_id: PageId) -> Result<Option<PageWriteGuard<'_>>> {
        let _lock = self.load_lock.lock();
        if self.pool.contains(page_id) {
            return Ok(None);
        }
        let data = self.disk.read_page(page_id)?;
        let (guard, evicted) = self.pool.install_page(page_id, Some(&data[..]))?;
        if let Some(evicted) = evicted {
            self.disk.write_page(evicted.page_id, &evicted.data)?;
        }
        Ok(Some(guard))
    }

    /// Allocates a new zeroed page, pinned and write-latched.
    pub fn new_page(&self) -> Result<(PageId, PageWriteGuard<'_>)> {
        let _lock = self.load_lock.lock();
        let page_id = self.disk.allocate_page()?;
        let (guard, evicted) = self.pool.install_page(page_id, None)?;
        if let Some(evicted) = evicted {
            self.disk.write_page(evicted.page_id, &evicted.data)?;
        }
        Ok((page_id, guard))
    }

    /// Deletes a page, dropping it from the pool and freeing it on disk.
    ///
    /// Returns false if the page is still pinned; the caller may retry or
    /// accept the leak.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        if self.pool.contains(page_id) && !self.pool.delete_page(page_id) {
            return false;
        }
        self.disk.free_page(page_id);
        true
    }

    /// Writes all dirty pages to disk and syncs the data file.
    ///
    /// Returns the number of pages written.
    pub fn flush(&self) -> Result<usize> {
        let disk = &self.disk;
        let flushed = self
            .pool
            .flush_all(|page_id, data| disk.write_page(page_id, data))?;
        self.disk.flush()?;
        Ok(flushed)
    }
}
