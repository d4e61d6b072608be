//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{ClockReplacer, Replacer};
use loam_common::page::{PageId, PAGE_SIZE};
use loam_common::{LoamError, Result};
use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use sysinfo::System;

/// Information about a dirty page that was evicted from the buffer pool.
/// Caller must write this to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping (lock-free page table)
/// - Free frame list for new pages
/// - Clock replacement for eviction
/// - Pin counting for concurrent access
///
/// Pages are handed out through RAII guards. A guard holds both the pin and
/// the page latch; dropping it releases the latch first and the pin second,
/// so a latch is never held on an unpinned page.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping (lock-free reads).
    page_table: PageTable,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in free list
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Queries the system for available memory and allocates 25% of it for
    /// the buffer pool. Minimum 1,000 frames to ensure useful caching even
    /// on low-memory systems.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Pins the frame holding `page_id`, if resident.
    ///
    /// Re-verifies the frame's page id after pinning: the frame may have
    /// been evicted and reassigned between the table lookup and the pin.
    #[inline]
    fn pin_frame(&self, page_id: PageId) -> Option<&BufferFrame> {
        let frame_id = self.page_table.get(page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.pin();
        if frame.page_id() != Some(page_id) {
            frame.unpin();
            return None;
        }
        self.replacer.record_access(frame_id);
        Some(frame)
    }

    /// Pins a resident page without latching it.
    pub fn pin_page(&self, page_id: PageId) -> Option<PinnedPage<'_>> {
        let frame = self.pin_frame(page_id)?;
        Some(PinnedPage {
            pool: self,
            page_id,
            frame,
        })
    }

    /// Pins and read-latches a resident page.
    pub fn read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        let frame = self.pin_frame(page_id)?;
        let data = frame.read_data();
        Some(PageReadGuard {
            pool: self,
            page_id,
            frame,
            data: Some(data),
        })
    }

    /// Pins and write-latches a resident page.
    pub fn write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        let frame = self.pin_frame(page_id)?;
        let data = frame.write_data();
        Some(PageWriteGuard {
            pool: self,
            page_id,
            frame,
            data: Some(data),
        })
    }

    /// Allocates a frame for a new page.
    ///
    /// Tries to get a free frame first, then evicts if necessary.
    /// Returns the frame ID and any evicted dirty page that must be flushed.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        // Try free list first
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok((frame_id, None));
            }
        }

        // Try to evict - check pin_count directly for each candidate frame
        let victim_id = self
            .replacer
            .evict(&|fid| self.frames[fid.0 as usize].pin_count() == 0);

        if let Some(victim_id) = victim_id {
            let frame = &self.frames[victim_id.0 as usize];

            // Capture evicted page data if dirty
            let evicted = if frame.is_dirty() {
                frame.page_id().map(|page_id| {
                    let data_guard = frame.read_data();
                    let mut data = Box::new([0u8; PAGE_SIZE]);
                    data.copy_from_slice(&**data_guard);
                    EvictedPage { page_id, data }
                })
            } else {
                None
            };

            // Remove old page from page table
            if let Some(old_page_id) = frame.page_id() {
                self.page_table.remove(old_page_id);
            }

            return Ok((victim_id, evicted));
        }

        Err(LoamError::BufferPoolFull)
    }

    /// Installs a page into the buffer pool and returns it write-latched.
    ///
    /// If `data` is provided the frame is loaded from it (page read from
    /// disk); otherwise the frame starts zeroed (freshly allocated page).
    /// If the page is already resident, the existing frame is returned and
    /// `data` is ignored.
    ///
    /// Returns (guard, evicted) where evicted contains any dirty page that
    /// was displaced to make room. Caller must write evicted pages to disk.
    pub fn install_page(
        &self,
        page_id: PageId,
        data: Option<&[u8]>,
    ) -> Result<(PageWriteGuard<'_>, Option<EvictedPage>)> {
        // Check if page already exists
        if let Some(guard) = self.write_page(page_id) {
            return Ok((guard, None));
        }

        // Allocate a frame
        let (frame_id, evicted) = self.allocate_frame()?;

        // Set up the frame
        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();

        let mut guard = frame.write_data();
        if let Some(src) = data {
            let len = src.len().min(PAGE_SIZE);
            guard[..len].copy_from_slice(&src[..len]);
        }

        // Publish the mapping only after the frame is fully set up
        self.page_table.insert(page_id, frame_id);

        Ok((
            PageWriteGuard {
                pool: self,
                page_id,
                frame,
                data: Some(guard),
            },
            evicted,
        ))
    }

    /// Unpins a page in the buffer pool.
    ///
    /// If the page becomes unpinned (pin count = 0), it becomes evictable.
    /// Evictability is determined by pin_count during eviction, not tracked
    /// separately.
    #[inline]
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if is_dirty {
                frame.set_dirty(true);
            }

            frame.unpin();
            return true;
        }
        false
    }

    /// Flushes a page to the provided callback.
    ///
    /// The callback receives the page data if the page is dirty.
    /// Returns true if the page was flushed.
    pub fn flush_page<F>(&self, page_id: PageId, mut flush_fn: F) -> Result<bool>
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if frame.is_dirty() {
                let data = frame.read_data();
                flush_fn(page_id, &data)?;
                frame.set_dirty(false);
                return Ok(true);
            }
            return Ok(false);
        }
        Ok(false)
    }

    /// Flushes all dirty pages.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_all<F>(&self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        let mut flushed = 0;
        let mut flush_error: Option<LoamError> = None;

        // Collect dirty pages first to avoid holding guards during flush
        let mut resident = Vec::new();
        self.page_table.for_each(|page_id, frame_id| {
            resident.push((page_id, frame_id));
            true
        });

        for (page_id, frame_id) in resident {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                if let Err(e) = flush_fn(page_id, &data) {
                    flush_error = Some(e);
                    break;
                }
                frame.set_dirty(false);
                flushed += 1;
            }
        }

        match flush_error {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    /// Deletes a page from the buffer pool.
    ///
    /// Returns true if the page was deleted.
    /// Returns false if the page is pinned or not in the pool.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        if let Some(frame_id) = self.page_table.remove(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            // Cannot delete pinned page - re-insert if pinned
            if frame.is_pinned() {
                self.page_table.insert(page_id, frame_id);
                return false;
            }

            // Remove from replacer and add to free list
            self.replacer.remove(frame_id);
            frame.reset();
            self.free_list.lock().push(frame_id);

            return true;
        }
        false
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_count = 0;
        let mut dirty_count = 0;

        self.page_table.for_each(|_, frame_id| {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_count += 1;
            }
            if frame.is_dirty() {
                dirty_count += 1;
            }
            true
        });

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: self.page_table.len(),
            pinned_frames: pinned_count,
            dirty_frames: dirty_count,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

/// RAII guard for a pinned, read-latched page.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: &'a BufferFrame,
    data: Option<RwLockReadGuard<'a, Box<[u8; PAGE_SIZE]>>>,
}

impl<'a> PageReadGuard<'a> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        self.data.as_ref().expect("page latch held")
    }

    /// Releases the latch but keeps the pin, for callers that need the page
    /// resident without blocking writers.
    pub fn into_pinned(mut self) -> PinnedPage<'a> {
        self.data.take();
        let pinned = PinnedPage {
            pool: self.pool,
            page_id: self.page_id,
            frame: self.frame,
        };
        std::mem::forget(self);
        pinned
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        // Latch released before the pin
        self.data.take();
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII guard for a pinned, write-latched page.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: &'a BufferFrame,
    data: Option<RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>>,
}

impl<'a> PageWriteGuard<'a> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        self.data.as_ref().expect("page latch held")
    }

    /// Returns mutable access to page data.
    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        self.data.as_mut().expect("page latch held")
    }

    /// Marks the page as dirty.
    pub fn set_dirty(&self) {
        self.frame.set_dirty(true);
    }

    /// Atomically converts the write latch into a read latch, keeping the pin.
    pub fn downgrade(mut self) -> PageReadGuard<'a> {
        let write_guard = self.data.take().expect("page latch held");
        let read_guard = RwLockWriteGuard::downgrade(write_guard);
        let guard = PageReadGuard {
            pool: self.pool,
            page_id: self.page_id,
            frame: self.frame,
            data: Some(read_guard),
        };
        std::mem::forget(self);
        guard
    }

    /// Releases the latch but keeps the pin.
    pub fn into_pinned(mut self) -> PinnedPage<'a> {
        self.data.take();
        let pinned = PinnedPage {
            pool: self.pool,
            page_id: self.page_id,
            frame: self.frame,
        };
        std::mem::forget(self);
        pinned
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        // Latch released before the pin
        self.data.take();
        self.pool.unpin_page(self.page_id, self.frame.is_dirty());
    }
}

/// A pinned page without a latch.
///
/// Keeps the frame resident; data access takes the latch per call.
pub struct PinnedPage<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: &'a BufferFrame,
}

impl PinnedPage<'_> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Read-latches the page data for the duration of the returned guard.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, false);
    }
}
